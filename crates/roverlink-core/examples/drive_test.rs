use roverlink_core::protocol::RoverLink;
use std::env;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "roverlink_core=debug".into()),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        println!("Usage: drive_test <serial_line>");
        return;
    }

    let link = RoverLink::new();
    link.select_line(&args[1]);
    println!("Opening: {}", args[1]);

    if let Err(e) = link.open().await {
        eprintln!("Failed to open line: {} ({})", e, e.user_message());
        std::process::exit(1);
    }
    println!("Line open");

    // Nudge forward, then stop.
    match link.set_direction("4").await {
        Ok(outcome) => println!("Direction set: {:?}", outcome),
        Err(e) => eprintln!("Direction rejected: {}", e),
    }
    match link.drive("5").await {
        Ok(outcome) => println!("Drive: {:?}", outcome),
        Err(e) => eprintln!("Drive failed: {}", e),
    }
    match link.drive("0").await {
        Ok(outcome) => println!("Stop: {:?}", outcome),
        Err(e) => eprintln!("Stop failed: {}", e),
    }

    match link.telemetry().await {
        Ok(frame) => {
            println!("Telemetry:");
            println!("  button: {}", frame.button);
            for (i, value) in frame.sensors.iter().enumerate() {
                println!("  sensor_{}: {}", i + 1, value);
            }
        }
        Err(e) => eprintln!("Telemetry failed: {} ({})", e, e.user_message()),
    }

    if let Err(e) = link.close().await {
        eprintln!("Close failed: {}", e);
    }
}
