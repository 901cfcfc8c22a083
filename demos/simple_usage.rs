use log_follow::{FollowConfig, follow_paths};
use std::time::Duration;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "app.log".to_string());
    let config = FollowConfig::default()
        .with_poll_interval(Duration::from_millis(250))
        .with_rotation_tracking(true);

    // Follow a log file and print lines as they are appended
    let mut stream = follow_paths([&path], config).await?;

    println!("Following {} - append to it from another shell...", path);

    let mut count = 0;
    while let Some(followed) = stream.next().await {
        match followed {
            Ok(followed) => {
                count += 1;
                print!("[{}] {}", count, followed.line);
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        }

        if count >= 10 {
            // Only show the first few lines for demo
            break;
        }
    }

    Ok(())
}
