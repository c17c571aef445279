use clap::{Parser, Subcommand};
use serde_json::json;

use crate::app::{build_router, AppState};
use crate::config::{config, DirectoryBackend};
use crate::directory::MemoryDirectory;
use crate::scope::ScopeRoutes;

#[derive(Parser)]
#[command(name = "school-scope-api")]
#[command(about = "Multi-tenant school API with request scope isolation")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Start the HTTP server (default)")]
    Serve,

    #[command(about = "Show which module the route table assigns to a path")]
    RouteModule {
        #[arg(help = "Request path, e.g. /payments/42")]
        path: String,
    },

    #[command(about = "Load and validate configuration, route tables and directory fixture")]
    CheckConfig,
}

#[derive(Debug, Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve().await,
        Commands::RouteModule { path } => route_module(&path, output_format),
        Commands::CheckConfig => check_config(output_format),
    }
}

async fn serve() -> anyhow::Result<()> {
    let config = config();
    tracing::info!("Starting School Scope API in {:?} mode", config.environment);

    let state = AppState::from_config(config)?;
    tracing::info!("Scope pipeline: {}", state.pipeline.stage_names().join(" -> "));
    let app = build_router(state);

    let bind_addr = format!("0.0.0.0:{}", config.server.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind {}: {}", bind_addr, e))?;

    tracing::info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn route_module(path: &str, output_format: OutputFormat) -> anyhow::Result<()> {
    let routes = ScopeRoutes::load(config().scope.routes_file.as_deref())?;
    let module = routes.module_table().resolve(path);
    let descriptor = routes.capabilities().describe(None, path);

    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "path": path,
                    "module": module,
                    "public": descriptor.public,
                    "cross_level_aggregation": descriptor.cross_level_aggregation,
                }))?
            );
        }
        OutputFormat::Text => match module {
            Some(module) => println!("{} -> {}", path, module),
            None => println!("{} -> (no module, X-Module-Type header required)", path),
        },
    }
    Ok(())
}

fn check_config(output_format: OutputFormat) -> anyhow::Result<()> {
    let config = config();
    config.validate()?;

    let routes = ScopeRoutes::load(config.scope.routes_file.as_deref())?;
    let tenants = match (config.directory.backend, config.directory.fixture_file.as_deref()) {
        (DirectoryBackend::Memory, Some(path)) => Some(MemoryDirectory::from_file(path)?.fixture().tenants.len()),
        _ => None,
    };

    match output_format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string_pretty(&json!({
                    "success": true,
                    "environment": format!("{:?}", config.environment),
                    "directory_backend": config.directory.backend,
                    "route_modules": routes.route_modules.len(),
                    "routes": routes.routes.len(),
                    "fixture_tenants": tenants,
                    "aggregation_module": config.scope.aggregation_module,
                }))?
            );
        }
        OutputFormat::Text => {
            println!("✓ Configuration valid ({:?})", config.environment);
            println!("  directory backend: {:?}", config.directory.backend);
            println!("  route modules: {}, route rules: {}", routes.route_modules.len(), routes.routes.len());
            if let Some(count) = tenants {
                println!("  fixture tenants: {}", count);
            }
            println!("  aggregation module: {}", config.scope.aggregation_module);
        }
    }
    Ok(())
}
