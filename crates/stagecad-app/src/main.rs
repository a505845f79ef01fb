//! StageCAD 命令行入口
//!
//! 打开、检查、重新打包 MVR 场景文档，以及与工程快照互相转换。

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::io::{BufRead, Write};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use stagecad_core::layer::LayerIndex;
use stagecad_file::{ConflictResolver, InterchangeConfig, PreferBundled, ProfileChoice, Session};

mod cli;

use cli::{Cli, CliCommand, ImportArgs};

/// 从标准输入逐个型号询问
struct StdinResolver;

impl ConflictResolver for StdinResolver {
    fn choose(&mut self, type_name: &str, bundled: &Path, dictionary: &Path) -> ProfileChoice {
        println!("Profile conflict for '{}':", type_name);
        println!("  [b] bundled:    {}", bundled.display());
        println!("  [d] dictionary: {}", dictionary.display());
        print!("Use which profile? [b/d] ");
        let _ = std::io::stdout().flush();

        let mut answer = String::new();
        match std::io::stdin().lock().read_line(&mut answer) {
            Ok(_) if answer.trim().eq_ignore_ascii_case("d") => ProfileChoice::Dictionary,
            _ => ProfileChoice::Bundled,
        }
    }
}

/// 控制台 + 日志文件；日志文件打不开时只输出到控制台
fn init_logging(log_file: &Path, verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    let (file_layer, open_error) = match OpenOptions::new().create(true).append(true).open(log_file) {
        Ok(file) => {
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), None)
        }
        Err(e) => (None, Some(e)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()?;

    if let Some(e) = open_error {
        warn!("Cannot open log file {}: {}", log_file.display(), e);
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<InterchangeConfig> {
    match path {
        Some(path) => InterchangeConfig::load(path)
            .with_context(|| format!("Failed to load settings from {}", path.display())),
        None => Ok(InterchangeConfig::default()),
    }
}

/// 按设置与命令行开关创建会话
fn open_session(config: &InterchangeConfig, args: Option<&ImportArgs>) -> Result<Session> {
    let mut config = config.clone();
    if let Some(args) = args {
        if let Some(dictionary) = &args.dictionary {
            config.dictionary_path = Some(dictionary.clone());
        }
        config.apply_dictionary |= args.apply_dictionary;
        config.prompt_conflicts |= args.prompt_conflicts;
    }

    let resolver: Box<dyn ConflictResolver> = if config.prompt_conflicts {
        Box::new(StdinResolver)
    } else {
        Box::new(PreferBundled)
    };
    let mut session = Session::new(config).with_resolver(resolver);
    session
        .load_configured_dictionary()
        .context("Failed to load profile dictionary")?;
    Ok(session)
}

fn import_into(session: &mut Session, input: &Path) -> Result<()> {
    if !session.import_with_config(input) {
        bail!("Import of {} failed, see log for details", input.display());
    }
    Ok(())
}

fn export_from(session: &mut Session, output: &Path) -> Result<()> {
    if !session.export_to_file(output) {
        bail!("Export to {} failed, see log for details", output.display());
    }
    Ok(())
}

fn print_scene(session: &Session) {
    let scene = session.scene();
    println!("Provider: {} {}", scene.provider, scene.provider_version);
    println!(
        "{} fixtures, {} trusses, {} supports, {} scene objects",
        scene.fixtures.len(),
        scene.trusses.len(),
        scene.supports.len(),
        scene.scene_objects.len()
    );

    let index = LayerIndex::build(scene);
    for layer in scene.layers.values() {
        let members = if layer.is_default() {
            index.unassigned()
        } else {
            index.members(&layer.name)
        };
        let color = layer.color.as_deref().unwrap_or("-");
        println!("\nLayer '{}' ({} entities, color {})", layer.name, members.len(), color);

        for entity in members {
            let transform = entity.as_entity().transform().decompose();
            let t = transform.translation;
            let r = transform.rotation_degrees;
            println!(
                "  {:<11} {:<24} at ({:.0}, {:.0}, {:.0}) mm, rotation ({:.1}, {:.1}, {:.1})",
                entity.kind().tag(),
                entity.name(),
                t.x,
                t.y,
                t.z,
                r.x,
                r.y,
                r.z
            );
        }
    }

    if !scene.fixtures.is_empty() {
        println!("\nFixtures:");
        for fixture in scene.fixtures.values() {
            println!(
                "  #{:<5} {:<24} {:<20} address {:<8} mode {}",
                fixture.fixture_id,
                fixture.name,
                fixture.type_name,
                if fixture.address.is_empty() { "-" } else { fixture.address.as_str() },
                fixture.gdtf_mode
            );
        }
    }

    for (name, geometry_count) in scene
        .symbols
        .values()
        .map(|s| (&s.name, s.geometries.len()))
    {
        println!("Symbol '{}' with {} geometries", name, geometry_count);
    }
    for name in index.orphaned_names(scene) {
        println!("Warning: entities reference undefined layer '{}'", name);
    }
}

fn run(cli: Cli, config: InterchangeConfig) -> Result<()> {
    match cli.command {
        CliCommand::Inspect { input, import } => {
            let mut session = open_session(&config, Some(&import))?;
            import_into(&mut session, &input)?;
            print_scene(&session);
        }
        CliCommand::Repack { input, output, import } => {
            let mut session = open_session(&config, Some(&import))?;
            import_into(&mut session, &input)?;
            export_from(&mut session, &output)?;
            if let Some(summary) = session.last_export() {
                println!(
                    "Wrote {} entities and {} resources to {}",
                    summary.entities,
                    summary.resources_written,
                    output.display()
                );
            }
        }
        CliCommand::Snapshot { input, output, import } => {
            let mut session = open_session(&config, Some(&import))?;
            import_into(&mut session, &input)?;
            session
                .save_snapshot(&output)
                .with_context(|| format!("Failed to save snapshot {}", output.display()))?;
        }
        CliCommand::Restore { input, output } => {
            let mut session = open_session(&config, None)?;
            session
                .load_snapshot(&input)
                .with_context(|| format!("Failed to load snapshot {}", input.display()))?;
            export_from(&mut session, &output)?;
        }
        CliCommand::InitConfig { output } => {
            config
                .save(&output)
                .with_context(|| format!("Failed to write settings to {}", output.display()))?;
            println!("Wrote settings to {}", output.display());
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    let log_file = cli.log_file.clone().unwrap_or_else(|| config.log_file.clone());
    init_logging(&log_file, cli.verbose)?;
    info!("Starting stagecad {}", env!("CARGO_PKG_VERSION"));

    run(cli, config)
}
