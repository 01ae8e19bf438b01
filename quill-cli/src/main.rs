mod config;

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use quill_core::{CompiledTemplate, Compiler, CompilerConfig, LocalFileStream, RenderContext};
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{FileConfig, Overrides, Policy, compiler_config};

/// Compile quill view templates into cached PHP.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[arg(long, global = true, value_name = "FILE", help = "Configuration file (defaults to ./quill.toml)")]
    config: Option<PathBuf>,

    #[arg(long, global = true, value_name = "DIR", help = "Directory templates are resolved against")]
    views: Option<PathBuf>,

    #[arg(long, global = true, value_name = "DIR", help = "Directory compiled artifacts are written to")]
    cache: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Log pipeline stages to stderr")]
    verbose: bool,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand, Debug)]
enum Action {
    /// Compile templates by logical name, e.g. `pages/home`.
    Compile {
        templates: Vec<String>,

        #[arg(long, help = "Compile every template under the views directory")]
        all: bool,

        #[arg(long, help = "Print compiled text instead of the artifact path")]
        print: bool,

        #[arg(long, help = "Check block ordering, not only marker counts")]
        strict: bool,

        #[arg(long, value_enum, value_name = "POLICY")]
        policy: Option<Policy>,

        #[arg(
            long = "var",
            value_name = "NAME=VALUE",
            value_parser = parse_var,
            help = "Share a variable with the compiled views"
        )]
        vars: Vec<(String, String)>,
    },
    /// Delete every compiled artifact under the cache directory.
    Clear,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    execute(cli)
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    let filter = std::env::var("QUILL_LOG")
        .ok()
        .and_then(|s| s.parse::<Targets>().ok())
        .unwrap_or_else(|| Targets::new().with_default(level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_level(true)
                .compact(),
        )
        .with(filter)
        .try_init()
        .ok();
}

fn execute(cli: Cli) -> Result<()> {
    let file = FileConfig::discover(cli.config.as_deref())?;

    match cli.action {
        Action::Compile {
            templates,
            all,
            print,
            strict,
            policy,
            vars,
        } => {
            let overrides = Overrides {
                views: cli.views,
                cache: cli.cache,
                policy,
                strict,
            };
            let config = compiler_config(&file, &overrides);

            let mut context = RenderContext::new();
            for (name, value) in &file.shared {
                context.share(name, value.as_str())?;
            }
            for (name, value) in &vars {
                context.share(name, value.as_str())?;
            }

            let compiled = compile_templates(config, &templates, all, &context)?;
            for (name, template) in compiled {
                write_output(&name, &template, print);
            }
        }
        Action::Clear => {
            let overrides = Overrides {
                views: cli.views,
                cache: cli.cache,
                ..Overrides::default()
            };
            let config = compiler_config(&file, &overrides);
            let removed = LocalFileStream
                .remove_files(&config.cache_root)
                .with_context(|| format!("failed to clear cache {}", config.cache_root.display()))?;
            println!("removed {removed} artifact(s) from {}", config.cache_root.display());
        }
    }

    Ok(())
}

fn compile_templates(
    config: CompilerConfig,
    templates: &[String],
    all: bool,
    context: &RenderContext,
) -> Result<Vec<(String, CompiledTemplate)>> {
    let mut names = templates.to_vec();
    if all {
        let found = LocalFileStream
            .templates(&config.views_root, &config.extension)
            .with_context(|| format!("failed to list templates in {}", config.views_root.display()))?;
        for path in found {
            if let Some(name) = config.logical_name(&path) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
    }
    if names.is_empty() {
        bail!("no templates given; pass template names or --all");
    }

    let compiler = Compiler::new(config);
    let mut compiled = Vec::with_capacity(names.len());
    for name in names {
        let template = compiler
            .compile_view(&name, context)
            .with_context(|| format!("failed to compile {name}"))?;
        compiled.push((name, template));
    }
    Ok(compiled)
}

fn write_output(name: &str, template: &CompiledTemplate, print: bool) {
    if print {
        println!("{}", template.text);
    } else {
        println!("{name} -> {}", template.cache_path.display());
    }
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim().to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got `{raw}`")),
    }
}
