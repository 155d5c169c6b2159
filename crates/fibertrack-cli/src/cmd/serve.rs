use anyhow::{Context as _, Result, anyhow};
use clap::Args;
use fibertrack_api::{ApiConfig, AppState, run_server};
use std::sync::Arc;

use super::CmdContext;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to bind. Overrides `[server] host`.
    #[arg(long)]
    pub host: Option<String>,

    /// Port to listen on. Overrides `[server] port` and `FIBERTRACK_PORT`.
    #[arg(long)]
    pub port: Option<u16>,

    /// Disable the permissive CORS layer.
    #[arg(long)]
    pub no_cors: bool,
}

impl ServeArgs {
    fn api_config(&self, ctx: &CmdContext) -> ApiConfig {
        let mut api = ApiConfig::from(&ctx.config.server);
        if let Some(ref host) = self.host {
            api.host.clone_from(host);
        }
        if let Some(port) = self.port {
            api.port = port;
        }
        if self.no_cors {
            api.enable_cors = false;
        }
        api
    }
}

/// Execute `ft serve`: run the HTTP API until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the database cannot be opened, the runtime cannot
/// start, or the listener fails.
pub fn run_serve(args: &ServeArgs, ctx: &CmdContext) -> Result<()> {
    let db = Arc::new(ctx.open_db()?);
    let state = AppState::new(db, &ctx.config);
    let api = args.api_config(ctx);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("start tokio runtime")?;

    runtime
        .block_on(run_server(&api, state))
        .map_err(|e| anyhow!(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::OutputMode;
    use fibertrack_core::FibertrackConfig;

    fn context() -> CmdContext {
        CmdContext {
            config: FibertrackConfig::default(),
            output: OutputMode::Text,
            actor: None,
        }
    }

    #[test]
    fn flags_override_server_config() {
        let args = ServeArgs {
            host: Some("0.0.0.0".into()),
            port: Some(8080),
            no_cors: true,
        };
        let api = args.api_config(&context());
        assert_eq!(api.host, "0.0.0.0");
        assert_eq!(api.port, 8080);
        assert!(!api.enable_cors);
    }

    #[test]
    fn config_used_without_flags() {
        let args = ServeArgs {
            host: None,
            port: None,
            no_cors: false,
        };
        let api = args.api_config(&context());
        assert_eq!(api.host, "127.0.0.1");
        assert_eq!(api.port, 3000);
        assert!(api.enable_cors);
    }
}
