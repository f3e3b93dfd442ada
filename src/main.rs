// blogmigrate: migrate a blog exported as SQL dump files into static
// Markdown content, mirror its remote assets, and point links at the local
// copies. Each phase is a subcommand so a migration can be re-run piecemeal.

mod assets;
mod logger;
mod parser;
mod post;
mod progress;
mod rewrite;

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::Path;

// Command-line flags and subcommands.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Enable debug logging (disables progress bars).
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a posts dump into Markdown files with frontmatter.
    Convert(ConvertArgs),
    /// Scan converted content for storage URLs and mirror the assets.
    Assets(AssetsArgs),
    /// Replace storage URLs in converted content with local paths.
    Rewrite(RewriteArgs),
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Posts dump file (INSERT ... VALUES ...).
    dump: String,

    /// Output directory for Markdown files.
    #[arg(long, default_value = "content/blog")]
    out_dir: String,

    /// Tags dump file (rows: id, name).
    #[arg(long, requires = "post_tags_dump")]
    tags_dump: Option<String>,

    /// Post-tag link dump file (rows: id, post id, tag id).
    #[arg(long, requires = "tags_dump")]
    post_tags_dump: Option<String>,
}

#[derive(Args, Debug)]
struct AssetsArgs {
    /// Directory containing converted Markdown files.
    content_dir: String,

    /// Storage base URL, e.g. https://proj.example.com/storage/v1/object/public.
    #[arg(long)]
    storage_url: String,

    /// Directory downloaded assets are written to.
    #[arg(long, default_value = "public/blog-images")]
    out_dir: String,

    /// Write the discovered-URL manifest to this JSON file.
    #[arg(long)]
    manifest: Option<String>,

    /// Write the download log to this JSON file.
    #[arg(long)]
    log_file: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,

    /// Attempts per asset before giving up.
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Delay between downloads in milliseconds.
    #[arg(long, default_value_t = 500)]
    delay_ms: u64,
}

#[derive(Args, Debug)]
struct RewriteArgs {
    /// Directory containing converted Markdown files.
    content_dir: String,

    /// Storage base URL the content still points at.
    #[arg(long)]
    storage_url: String,
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if std::env::args().len() == 1 {
        Cli::command().print_help()?;
        eprintln!();
        std::process::exit(1);
    }
    let cli = Cli::parse();

    // Initialize logging based on --debug.
    logger::set_debug(cli.debug);

    // Progress bars are disabled in debug mode to avoid mangled output.
    let progress = progress::ProgressManager::new(!cli.debug);

    match cli.command {
        Command::Convert(args) => run_convert(&args, &progress),
        Command::Assets(args) => run_assets(&args, &progress),
        Command::Rewrite(args) => run_rewrite(&args, &progress),
    }
}

fn run_convert(
    args: &ConvertArgs,
    progress: &progress::ProgressManager,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    logger::debug(&format!("convert: posts dump {}", args.dump));

    let post_tags: HashMap<String, Vec<String>> =
        match (args.tags_dump.as_deref(), args.post_tags_dump.as_deref()) {
            (Some(tags), Some(links)) => {
                let names = post::load_tag_names(tags)?;
                post::load_post_tags(links, &names)?
            }
            _ => HashMap::new(),
        };

    let report = post::convert_dump(&args.dump, Path::new(&args.out_dir), &post_tags, progress)?;

    let sep = "=".repeat(60);
    let mut stderr = io::stderr();
    writeln!(stderr, "\n{}\nCONVERT SUMMARY\n{}", sep, sep)?;
    writeln!(stderr, "Written:  {}", report.written)?;
    writeln!(stderr, "Skipped:  {}", report.skipped.len())?;
    writeln!(stderr, "Errors:   {}", report.write_errors)?;
    if !report.skipped.is_empty() {
        writeln!(stderr, "\nSkipped records:")?;
        for skip in &report.skipped {
            writeln!(
                stderr,
                "  - record {}: {} fields (expected {})",
                skip.index,
                skip.fields,
                post::POST_COLUMNS
            )?;
        }
    }
    writeln!(stderr, "{}", sep)?;
    Ok(())
}

fn run_assets(
    args: &AssetsArgs,
    progress: &progress::ProgressManager,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let scan = assets::scan_content_dir(Path::new(&args.content_dir), &args.storage_url)?;
    logger::info(&format!(
        "assets: {} unique urls across {} files",
        scan.total_images, scan.total_files_with_images
    ));

    if let Some(path) = args.manifest.as_deref() {
        std::fs::write(path, serde_json::to_string_pretty(&scan)?)?;
        logger::debug(&format!("assets: manifest written to {}", path));
    }

    let downloader = assets::Downloader::new(args.timeout_secs, args.retries, args.delay_ms)?;
    let log = downloader.mirror(&scan.image_urls, Path::new(&args.out_dir), progress)?;

    if let Some(path) = args.log_file.as_deref() {
        std::fs::write(path, serde_json::to_string_pretty(&log)?)?;
        logger::debug(&format!("assets: download log written to {}", path));
    }

    let sep = "=".repeat(60);
    let mut stderr = io::stderr();
    writeln!(stderr, "\n{}\nDOWNLOAD SUMMARY\n{}", sep, sep)?;
    writeln!(stderr, "Total:    {}", log.total)?;
    writeln!(stderr, "Success:  {}", log.success)?;
    writeln!(stderr, "Skipped:  {}", log.skipped)?;
    writeln!(stderr, "Failed:   {}", log.failed)?;
    if log.failed > 0 {
        writeln!(stderr, "\nFailed downloads:")?;
        for item in log.downloads.iter().filter(|d| d.status == "failed") {
            writeln!(
                stderr,
                "  - {}: {}",
                item.filename,
                item.error.as_deref().unwrap_or("unknown error")
            )?;
        }
    }
    writeln!(stderr, "{}", sep)?;
    Ok(())
}

fn run_rewrite(
    args: &RewriteArgs,
    progress: &progress::ProgressManager,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let rewriter = rewrite::UrlRewriter::new(&args.storage_url)?;
    let report = rewrite::rewrite_dir(Path::new(&args.content_dir), &rewriter, progress)?;

    let sep = "=".repeat(60);
    let mut stderr = io::stderr();
    writeln!(stderr, "\n{}\nREWRITE SUMMARY\n{}", sep, sep)?;
    writeln!(stderr, "Files processed:  {}", report.files_processed)?;
    writeln!(stderr, "Files updated:    {}", report.files_updated)?;
    writeln!(stderr, "URLs replaced:    {}", report.urls_replaced)?;
    writeln!(stderr, "{}", sep)?;
    Ok(())
}
