use anyhow::Result;
use clap::{Parser, Subcommand};
use vtlc::{init_tracing_once, DumpSource, PipelineOptions, TableFormat, Vtlc};

#[derive(Parser, Debug)]
#[command(name = "vtlc", version, about = "Monthly VTuber live chat datasets and per-channel stats")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Only the last N months (0 = full history).
    #[arg(long, global = true, env = "VTLC_RECENT")]
    recent: Option<u32>,

    /// Stop at the start of the current, unfinished month.
    #[arg(long, global = true, env = "VTLC_IGNORE_HALFWAY")]
    ignore_halfway: bool,

    /// Glob over table file names (stats and postprocess).
    #[arg(long, global = true)]
    matcher: Option<String>,

    /// Output format of the monthly tables: csv or csv-zst.
    #[arg(long, global = true, default_value = "csv")]
    format: TableFormat,

    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Extract monthly chat/superchat tables and the moderation tables.
    Generate,
    /// Per-channel-per-month chat and superchat statistics.
    Stats,
    /// Compressed copies into the complete dataset directory.
    Postprocess,
    /// generate, stats, then postprocess.
    All,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing_once();

    let mut opts = PipelineOptions::from_env()?
        .with_recent(cli.recent)
        .with_ignore_halfway(cli.ignore_halfway)
        .with_format(cli.format)
        .with_progress(!cli.no_progress);
    if let Some(m) = &cli.matcher {
        opts = opts.with_matcher(m.clone());
    }
    let source = DumpSource::new(&opts.source_dir).read_buffer(opts.read_buffer_bytes);
    let vtlc = Vtlc::from_options(opts);

    if matches!(cli.command, Command::Generate | Command::All) {
        let s = vtlc.generate(&source)?;
        println!(
            "generate: {} windows, {} chats, {} superchats, {} bans, {} deletions ({} malformed skipped)",
            s.windows, s.chats, s.superchats, s.bans, s.deletions, s.malformed
        );
    }
    if matches!(cli.command, Command::Stats | Command::All) {
        let s = vtlc.stats()?;
        println!(
            "stats: {} chat rows, {} superchat rows, {} rate fetches",
            s.chat_rows, s.superchat_rows, s.rate_fetches
        );
    }
    if matches!(cli.command, Command::Postprocess | Command::All) {
        let written = vtlc.postprocess()?;
        println!("postprocess: {} files", written.len());
    }
    Ok(())
}
