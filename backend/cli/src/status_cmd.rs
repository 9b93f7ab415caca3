//! CLI Status Command
//!
//! Queries a running relay's health endpoint.

use anyhow::Result;
use serde_json::Value;

pub async fn run(port: u16) -> Result<()> {
    let client = reqwest::Client::new();
    match client
        .get(format!("http://localhost:{port}/api/health"))
        .send()
        .await
    {
        Ok(resp) => {
            let body: Value = resp.json().await?;
            println!("locshare relay on port {port}");
            println!("  sessions:          {}", body["sessions"]);
            println!("  bound connections: {}", body["boundConnections"]);
            println!("  open sockets:      {}", body["connections"]);
        }
        Err(_) => {
            println!("locshare is not running on port {port}");
        }
    }
    Ok(())
}
