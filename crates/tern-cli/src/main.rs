//! Tern - build, deploy and release apps from a git repository
//!
//! Usage:
//!   tern build             # Build component images
//!   tern publish           # Build and push images, then deploy
//!   tern deploy            # Deploy the current commit
//!   tern generate          # Print the deployment without applying it
//!   tern release <id> -e   # Activate a deployment in a virtual environment

mod prompts;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tern_core::Error;
use tern_core::cluster::Resource;
use tern_core::config::{ConfigStore, TernConfig};
use tern_core::context::TernContext;
use tern_core::deadline::CancelSignal;
use tern_core::deploy::{AssembleOptions, DeploymentDescriptor, ReconcileOptions};
use tern_core::image::{BuildOptions, ImageRef};
use tern_core::platform::PlatformFlags;
use tern_core::release::{Problem, ReleaseBinding, ReleaseOptions};

use crate::prompts::TermPrompter;

#[derive(Parser)]
#[command(name = "tern")]
#[command(about = "Build, deploy and release apps from a git repository", long_about = None)]
struct Cli {
    /// App directory (containing app.toml)
    #[arg(long, short = 'C', global = true, default_value = ".")]
    app: PathBuf,

    /// Container registry, overriding config (app.toml still wins)
    #[arg(long, global = true)]
    registry: Option<String>,

    /// Never prompt; every question takes its default answer
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build component images that do not exist yet
    Build(BuildArgs),

    /// Build and push every component image, then deploy
    Publish {
        #[command(flatten)]
        deploy: DeployArgs,

        /// Rebuild images even when they exist
        #[arg(long)]
        force: bool,

        /// Only publish images, do not deploy
        #[arg(long)]
        skip_deploy: bool,
    },

    /// Assemble a deployment for HEAD and apply it to the platform
    Deploy(DeployArgs),

    /// Print the deployment for HEAD without touching the cluster
    Generate(AssembleArgs),

    /// Activate a deployment in a virtual environment
    ///
    /// The deployment is looked up by name, then by full or short commit,
    /// version, tag and branch.
    Release(ReleaseArgs),
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable summary
    #[default]
    Text,
    /// Machine-readable JSON
    Json,
}

#[derive(Args)]
struct BuildArgs {
    /// Rebuild images even when they exist
    #[arg(long)]
    force: bool,

    /// Build without the engine cache
    #[arg(long)]
    no_cache: bool,

    /// Push built images to the registry
    #[arg(long)]
    push: bool,

    /// Side-load images into the local kind cluster
    #[arg(long)]
    kind: bool,
}

#[derive(Args)]
struct AssembleArgs {
    /// Deployment name (default: app name suffixed with version, branch, tag or commit)
    #[arg(long)]
    name: Option<String>,

    /// Semantic version of this deployment, e.g. v1.2.3
    #[arg(long)]
    version: Option<String>,

    /// Tag HEAD with the version
    #[arg(long, requires = "version")]
    create_tag: bool,

    /// Side-load images into the local kind cluster
    #[arg(long)]
    kind: bool,
}

#[derive(Args)]
struct PlatformArgs {
    /// Platform namespace
    #[arg(long, short)]
    namespace: Option<String>,

    /// Platform name
    #[arg(long, short)]
    platform: Option<String>,
}

impl PlatformArgs {
    fn flags(&self) -> PlatformFlags {
        PlatformFlags {
            namespace: self.namespace.clone(),
            name: self.platform.clone(),
        }
    }
}

#[derive(Args)]
struct DeployArgs {
    #[command(flatten)]
    assemble: AssembleArgs,

    #[command(flatten)]
    platform: PlatformArgs,

    /// Validate against the cluster without persisting anything
    #[arg(long)]
    dry_run: bool,

    /// Seconds to wait for components to become ready (0 skips the wait)
    #[arg(long, short, default_value_t = 0)]
    wait: u64,
}

#[derive(Args)]
struct ReleaseArgs {
    /// Deployment name, commit, version, tag or branch
    identifier: String,

    /// Virtual environment to release into
    #[arg(long = "virtual-env", short = 'e')]
    virtual_env: String,

    /// Release with the data of an existing snapshot
    #[arg(long, conflicts_with = "create_snapshot")]
    snapshot: Option<String>,

    /// Freeze the environment data in a snapshot
    #[arg(long)]
    create_snapshot: bool,

    #[command(flatten)]
    platform: PlatformArgs,

    /// Validate without changing the virtual environment
    #[arg(long)]
    dry_run: bool,

    /// Seconds to wait for components to become ready (0 skips the wait)
    #[arg(long, short, default_value_t = 0)]
    wait: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "tern=debug,info" } else { "tern=info,warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let (handle, cancel) = CancelSignal::pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            handle.cancel();
        }
    });

    let store = ConfigStore::user()?;
    let mut config = store.load()?;
    config.apply_env_overrides();
    apply_cli_overrides(&mut config, &cli);

    let ctx = TernContext::open(&cli.app, config)?
        .with_store(store)
        .with_prompter(TermPrompter::detect(!cli.non_interactive))
        .with_cancel_signal(cancel);

    run(&ctx, cli.command, cli.format).await
}

fn apply_cli_overrides(config: &mut TernConfig, cli: &Cli) {
    if let Some(registry) = &cli.registry {
        config.registry.address = Some(registry.clone());
    }
}

async fn run(ctx: &TernContext, command: Commands, format: OutputFormat) -> Result<()> {
    match command {
        Commands::Build(args) => {
            let options = BuildOptions {
                force: args.force,
                no_cache: args.no_cache,
                push: args.push,
                sideload: true,
            };
            let images = ctx
                .assembler(args.kind)?
                .build_all(options)
                .await
                .context("Failed to build component images")?;
            print_images(&images, format)?;
        }
        Commands::Publish {
            deploy,
            force,
            skip_deploy,
        } => {
            let options = BuildOptions {
                force,
                push: true,
                ..BuildOptions::default()
            };
            let images = ctx
                .assembler(deploy.assemble.kind)?
                .build_all(options)
                .await
                .context("Failed to publish component images")?;
            if skip_deploy {
                print_images(&images, format)?;
            } else {
                run_deploy(ctx, &deploy, true, format).await?;
            }
        }
        Commands::Deploy(args) => run_deploy(ctx, &args, false, format).await?,
        Commands::Generate(args) => {
            let descriptor = assemble(ctx, &args, false).await?;
            let resource = descriptor.to_resource()?;
            print_deployment(&descriptor, &resource, format, "Generated")?;
        }
        Commands::Release(args) => run_release(ctx, &args, format).await?,
    }
    Ok(())
}

async fn assemble(
    ctx: &TernContext,
    args: &AssembleArgs,
    skip_image_check: bool,
) -> Result<DeploymentDescriptor> {
    let options = AssembleOptions {
        name: args.name.clone(),
        version: args.version.clone(),
        create_tag: args.create_tag,
        skip_image_check,
    };
    let mut descriptor = ctx
        .assembler(args.kind)?
        .assemble(&options)
        .await
        .context("Failed to assemble deployment")?;
    descriptor.apply_index_labels();
    Ok(descriptor)
}

async fn run_deploy(
    ctx: &TernContext,
    args: &DeployArgs,
    skip_image_check: bool,
    format: OutputFormat,
) -> Result<()> {
    let mut descriptor = assemble(ctx, &args.assemble, skip_image_check).await?;
    let platform = ctx
        .resolve_platform(&args.platform.flags())
        .await
        .context("Failed to resolve target platform")?;

    let options = ReconcileOptions {
        dry_run: args.dry_run,
        wait_timeout: Duration::from_secs(args.wait),
    };
    let applied = ctx
        .reconciler()?
        .reconcile(&mut descriptor, &platform, options)
        .await
        .with_context(|| format!("Failed to deploy '{}'", descriptor.name))?;

    let verb = if args.dry_run { "Validated" } else { "Deployed" };
    print_deployment(&descriptor, &applied, format, verb)
}

async fn run_release(ctx: &TernContext, args: &ReleaseArgs, format: OutputFormat) -> Result<()> {
    let platform = ctx
        .resolve_platform(&args.platform.flags())
        .await
        .context("Failed to resolve target platform")?;
    let options = ReleaseOptions {
        virtual_env: args.virtual_env.clone(),
        snapshot: args.snapshot.clone(),
        create_snapshot: args.create_snapshot,
        dry_run: args.dry_run,
        wait_timeout: Duration::from_secs(args.wait),
    };

    match ctx
        .releaser()?
        .release(&args.identifier, &platform, &options)
        .await
    {
        Ok(binding) => print_binding(&binding, format, args.dry_run),
        Err(Error::ValidationProblems(problems)) => {
            print_problems(&problems, format)?;
            std::process::exit(2);
        }
        Err(err) => Err(err).with_context(|| format!("Failed to release '{}'", args.identifier)),
    }
}

fn print_images(images: &[ImageRef], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            for image in images {
                println!("✓ {image}");
            }
        }
        OutputFormat::Json => {
            let names: Vec<String> = images.iter().map(ImageRef::to_string).collect();
            println!("{}", serde_json::to_string_pretty(&names)?);
        }
    }
    Ok(())
}

fn print_deployment(
    descriptor: &DeploymentDescriptor,
    resource: &Resource,
    format: OutputFormat,
    verb: &str,
) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("✓ {verb} deployment '{}'", descriptor.name);
            if let Some(ns) = &descriptor.namespace {
                println!("  namespace: {ns}");
            }
            if let Some(version) = &descriptor.spec.version {
                println!("  version:   {version}");
            }
            println!("  commit:    {}", descriptor.spec.commit);
            for (name, component) in &descriptor.spec.components {
                println!("  • {name} ({})", component.hash);
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&resource.to_value()?)?);
        }
    }
    Ok(())
}

fn print_binding(binding: &ReleaseBinding, format: OutputFormat, dry_run: bool) -> Result<()> {
    match format {
        OutputFormat::Text => {
            let verb = if dry_run { "Validated release of" } else { "Released" };
            println!(
                "✓ {verb} '{}' into '{}'",
                binding.deployment_name, binding.virtual_env
            );
            if let Some(snapshot) = &binding.snapshot_name {
                println!("  snapshot: {snapshot}");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(binding)?),
    }
    Ok(())
}

fn print_problems(problems: &[Problem], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!("✗ {} problem(s) would prevent release activation", problems.len());
            for problem in problems {
                println!("  ⚠ {problem}");
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(problems)?),
    }
    Ok(())
}
