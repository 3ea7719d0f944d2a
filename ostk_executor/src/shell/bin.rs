// Binary entry point for ostk_executor
// This is a thin wrapper that delegates to the library implementation

use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = ostk_executor::shell::run().await {
        eprintln!("ostk_executor fatal error: {:#}", e);
        return Err(e);
    }
    Ok(())
}
