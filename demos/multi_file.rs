use log_follow::{Consumer, FollowConfig, FollowLoop};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Log Follow Multi-File Example ===\n");

    let dir = std::env::temp_dir().join(format!("log-follow-demo-{}", std::process::id()));
    fs::create_dir_all(&dir)?;
    let access = dir.join("access.log");
    let errors = dir.join("error.log");
    fs::write(&access, "old access line, never shown\n")?;
    fs::write(&errors, "")?;

    let config = FollowConfig::default()
        .with_poll_interval(Duration::from_millis(100))
        .with_max_duration(Duration::from_secs(2))
        .with_rotation_tracking(true);

    // Print a header whenever the source file changes
    let mut last_source: Option<PathBuf> = None;
    let consumer = Consumer::line_and_source(move |line, path| {
        if last_source.as_deref() != Some(path) {
            println!("==> {} <==", path.display());
            last_source = Some(path.to_path_buf());
        }
        print!("  {}", line);
        Ok(())
    });

    let mut follow = FollowLoop::new(config).with_consumer(consumer);
    follow.register(&access).await?;
    follow.register(&errors).await?;
    follow.open_pending().await;

    // Simulate writers, including a logrotate-style rotation halfway through
    let writer_access = access.clone();
    let writer = tokio::spawn(async move {
        for i in 0..6 {
            tokio::time::sleep(Duration::from_millis(150)).await;
            let target = if i % 3 == 2 { &errors } else { &writer_access };
            let mut file = OpenOptions::new().append(true).open(target)?;
            writeln!(file, "event {}", i)?;

            if i == 3 {
                let mut rotated = writer_access.as_os_str().to_os_string();
                rotated.push(".1");
                fs::rename(&writer_access, &rotated)?;
                fs::write(&writer_access, "first line after rotation\n")?;
            }
        }
        Ok::<_, std::io::Error>(())
    });

    follow.run().await?;
    writer.await??;

    fs::remove_dir_all(&dir)?;
    Ok(())
}
