// Keyboard teleop: motion keys, I idle, Q quit
//
// W walk, A auto-walk, L/R turn, D dance, S sing, U sensor debug.
// Each key press publishes one command; the runtime queues it until the
// running motion completes.
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use std::time::Duration;
use tracing::{info, warn};

use quadbot_runtime::config::{TOPIC_CMD, TOPIC_STATUS};
use quadbot_runtime::messages::{RobotCommand, RuntimeStatus};
use quadbot_runtime::motion::MotionKind;

fn motion_for_key(key: char) -> Option<MotionKind> {
    match key.to_ascii_lowercase() {
        'w' => Some(MotionKind::Walking),
        'a' => Some(MotionKind::AutoWalking),
        'l' => Some(MotionKind::TurningLeft),
        'r' => Some(MotionKind::TurningRight),
        'd' => Some(MotionKind::Dancing),
        's' => Some(MotionKind::Singing),
        'u' => Some(MotionKind::DebugSensor),
        'i' => Some(MotionKind::Idle),
        _ => None,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    info!("Opening Zenoh session...");
    let session = zenoh::open(zenoh::Config::default()).await?;
    let publisher = session.declare_publisher(TOPIC_CMD).await?;
    let status = session.declare_subscriber(TOPIC_STATUS).await?;

    info!("Controls: W=walk, A=auto, L/R=turn, D=dance, S=sing, U=sensor, I=idle, Q=quit");

    enable_raw_mode()?;
    let result = run_teleop(&publisher, &status).await;
    disable_raw_mode()?;

    result
}

async fn run_teleop(
    publisher: &zenoh::pubsub::Publisher<'_>,
    status: &zenoh::pubsub::Subscriber<zenoh::handlers::FifoChannelHandler<zenoh::sample::Sample>>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut last_status: Option<RuntimeStatus> = None;

    loop {
        if event::poll(Duration::from_millis(20))? {
            if let Event::Key(KeyEvent { code, kind, .. }) = event::read()? {
                if kind != KeyEventKind::Press {
                    continue;
                }

                match code {
                    KeyCode::Char('q') | KeyCode::Esc => break,
                    KeyCode::Char(key) => match motion_for_key(key) {
                        Some(motion) => {
                            let cmd = serde_json::to_string(&RobotCommand::Motion { motion })?;
                            publisher.put(cmd).await?;
                            info!("Requested {:?}", motion);
                        }
                        None => warn!("No command on key {:?}", key),
                    },
                    _ => {}
                }
            }
        }

        // Report motion changes from the runtime
        while let Ok(Some(sample)) = status.try_recv() {
            let payload = sample.payload().to_bytes();
            let Ok(current) = serde_json::from_slice::<RuntimeStatus>(&payload) else {
                continue;
            };
            let changed = last_status
                .map(|prev| prev.motion != current.motion || prev.phase != current.phase)
                .unwrap_or(true);
            if changed {
                info!("Robot: {:?} ({:?})", current.motion, current.phase);
            }
            last_status = Some(current);
        }
    }

    Ok(())
}
