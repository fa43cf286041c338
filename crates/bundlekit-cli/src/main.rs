//! Bundlekit CLI - publish and check bundles for cluster-native provisioning

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod commands;
mod error;
mod exit_codes;

use commands::run::RunOptions;

const PLAIN_PROVISIONER: &str = "core-bundlekit-io-plain";

#[derive(Parser)]
#[command(name = "bundlekit")]
#[command(author = "Bundlekit Contributors")]
#[command(version)]
#[command(about = "Publish and check bundles for cluster-native provisioning", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload a local bundle directory and apply a BundleDeployment for it
    Run {
        /// BundleDeployment name
        name: String,

        /// Bundle directory
        bundle_dir: PathBuf,

        /// Provisioner class name to set on the bundle
        #[arg(long, default_value = PLAIN_PROVISIONER)]
        bundle_provisioner_class: String,

        /// Provisioner class name to set on the bundle deployment
        #[arg(long, default_value = PLAIN_PROVISIONER)]
        bundle_deployment_provisioner_class: String,

        /// JSON deployment config; '@config.json' loads it from a file
        #[arg(long)]
        config: Option<String>,

        /// Namespace the bundlekit controllers run in
        #[arg(long, env = "BUNDLEKIT_SYSTEM_NAMESPACE", default_value = "bundlekit-system")]
        system_namespace: String,
    },

    /// Check a bundle directory with a provisioner, without a cluster
    Validate {
        /// Bundle directory
        bundle_dir: PathBuf,

        /// Provisioner class name
        #[arg(short, long, default_value = PLAIN_PROVISIONER)]
        provisioner: String,

        /// JSON deployment config to resolve as well; '@config.json' loads it from a file
        #[arg(long)]
        config: Option<String>,
    },

    /// Print the CustomResourceDefinitions
    Crds,
}

fn init_tracing(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();
    init_tracing(cli.debug);

    let result = match cli.command {
        Commands::Run {
            name,
            bundle_dir,
            bundle_provisioner_class,
            bundle_deployment_provisioner_class,
            config,
            system_namespace,
        } => {
            commands::run::run(RunOptions {
                name: &name,
                bundle_dir: &bundle_dir,
                bundle_provisioner_class: &bundle_provisioner_class,
                bundle_deployment_provisioner_class: &bundle_deployment_provisioner_class,
                config: config.as_deref(),
                system_namespace: &system_namespace,
            })
            .await
        }

        Commands::Validate {
            bundle_dir,
            provisioner,
            config,
        } => commands::validate::run(&bundle_dir, &provisioner, config.as_deref()).await,

        Commands::Crds => commands::crds::run(),
    };

    if let Err(err) = result {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}
