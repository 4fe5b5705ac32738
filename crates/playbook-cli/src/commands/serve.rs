use tracing::{info, warn};

use playbook_config::ConfigLoader;
use playbook_core::Result;
use playbook_mcp::McpServer;
use playbook_store::Database;

pub(super) async fn cmd_serve(config_loader: ConfigLoader, listen: Option<String>) -> Result<()> {
    let config = config_loader.get();
    let listen = listen.unwrap_or_else(|| config.server.listen.clone());

    println!("Playbook MCP v{}", env!("CARGO_PKG_VERSION"));
    println!("   Listen:   http://{listen}/mcp/<playbook_id>");
    println!("   Database: {}", config.store.db_path.display());

    // Kept alive for the lifetime of the server
    let _watcher = match config_loader.watch() {
        Ok(w) => {
            println!("   Config hot-reload: enabled");
            Some(w)
        }
        Err(e) => {
            warn!(error = %e, "config hot-reload disabled");
            None
        }
    };
    println!();

    let db = Database::open(&config.store.db_path)?;
    let shared = config_loader.shared();
    let mcp = McpServer::new(db, shared.clone());

    info!(listen = %listen, db = %config.store.db_path.display(), "starting playbook MCP server");
    playbook_server::start_server(mcp, shared, &listen).await
}
