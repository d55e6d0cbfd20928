// Binary entry point for ferry
// This is a thin wrapper that delegates to the library implementation

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = ferry::shell::run().await {
        eprintln!("ferry fatal error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
