use std::sync::Arc;

use ofp_core::SwitchManager;

#[tokio::main]
async fn main() {
    env_logger::init();
    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:6633".to_string());
    let manager = Arc::new(SwitchManager::new());
    if let Err(e) = manager.listen(addr.as_str()).await {
        log::error!("controller stopped: {}", e);
        std::process::exit(1);
    }
}
