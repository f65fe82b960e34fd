use crate::codec::{decode_token, encode_token, letter_from_url, share_url, view_mode, ViewMode};
use crate::compress::{compress_image_async, CompressOptions};
use crate::config::Config;
use crate::history::LetterHistory;
use crate::hosting::{ImageHost, ImgbbHost};
use crate::letter::LetterDocument;
use crate::render::{render_letter, Fragment};
use crate::session::{AttachOutcome, EditingSession};
use crate::shortlink_client::{ShortLinkClient, ShortenOutcome};
use colored::*;
use std::path::Path;

/// Shared CLI implementation behind the `letterpost` binary.
pub async fn run(args: Vec<String>) -> anyhow::Result<()> {
    let bin = args
        .first()
        .map(|s| s.as_str())
        .unwrap_or("letterpost")
        .to_string();

    if args.len() < 2 {
        print_usage(&bin);
        return Ok(());
    }

    let config = Config::from_env();
    let command = &args[1];

    match command.as_str() {
        "encode" => {
            if args.len() < 3 {
                eprintln!("{}", format!("Usage: {} encode <letter.json> [page_url]", bin).yellow());
                return Ok(());
            }
            let doc = read_letter_file(Path::new(&args[2]))?;
            match args.get(3) {
                Some(page) => println!("{}", share_url(page, &doc)),
                None => println!("{}", encode_token(&doc)),
            }
        }
        "decode" => {
            if args.len() < 3 {
                eprintln!("{}", format!("Usage: {} decode <share_url|token>", bin).yellow());
                return Ok(());
            }
            match letter_from_arg(&args[2]) {
                Some(doc) => println!("{}", serde_json::to_string_pretty(&doc)?),
                None => {
                    eprintln!("{} Not a readable letter link", "✗".red().bold());
                }
            }
        }
        "mode" => {
            if args.len() < 3 {
                eprintln!("{}", format!("Usage: {} mode <url>", bin).yellow());
                return Ok(());
            }
            match view_mode(&args[2]) {
                ViewMode::Viewer { .. } => println!("{}", "viewer".green()),
                ViewMode::Composer => println!("{}", "composer".cyan()),
            }
        }
        "render" => {
            if args.len() < 3 {
                eprintln!("{}", format!("Usage: {} render <letter.json|share_url> [--json]", bin).yellow());
                return Ok(());
            }
            let doc = load_letter(&args[2])?;
            let as_json = args.iter().skip(3).any(|a| a == "--json");
            show_render(&doc, as_json)?;
        }
        "compress" => {
            if args.len() < 4 {
                eprintln!("{}", format!("Usage: {} compress <input> <output>", bin).yellow());
                return Ok(());
            }
            compress_file(&config, Path::new(&args[2]), Path::new(&args[3])).await?;
        }
        "upload" => {
            if args.len() < 3 {
                eprintln!("{}", format!("Usage: {} upload <image>", bin).yellow());
                return Ok(());
            }
            upload_file(&config, Path::new(&args[2])).await?;
        }
        "shorten" => {
            if args.len() < 3 {
                eprintln!("{}", format!("Usage: {} shorten <long_url>", bin).yellow());
                return Ok(());
            }
            let client = ShortLinkClient::from_config(&config);
            print_outcome(&client.shorten(&args[2]).await);
        }
        "share" => {
            if args.len() < 4 {
                eprintln!("{}", format!("Usage: {} share <letter.json> <page_url>", bin).yellow());
                return Ok(());
            }
            let doc = read_letter_file(Path::new(&args[2]))?;
            share(&config, doc, &args[3]).await?;
        }
        "history" => {
            let history = open_history(&config)?;
            match args.get(2).map(String::as_str).unwrap_or("list") {
                "list" => list_history(&history),
                "remove" => {
                    let Some(id) = args.get(3) else {
                        eprintln!("{}", format!("Usage: {} history remove <id>", bin).yellow());
                        return Ok(());
                    };
                    if history.remove(id)? {
                        println!("{} Removed {}", "✓".green(), id.cyan());
                    } else {
                        eprintln!("{} No saved letter with id {}", "✗".red().bold(), id.red());
                    }
                }
                "clear" => {
                    history.clear()?;
                    println!("{} History cleared", "✓".green());
                }
                other => {
                    eprintln!("{} Unknown history action: {}", "✗".red().bold(), other.red());
                }
            }
        }
        _ => {
            eprintln!("{} Unknown command: {}", "✗".red().bold(), command.red());
            print_usage(&bin);
        }
    }

    Ok(())
}

fn print_usage(bin: &str) {
    println!("{}", "📮 Letterpost CLI".bright_cyan().bold());
    println!();
    println!("{}", "Usage:".bright_white().bold());
    println!("  {} <command> [args]", bin.cyan());
    println!();
    println!("{}", "Commands:".bright_white().bold());
    println!("  {} <letter.json> [page_url]      Print the letter token or share URL", "encode".cyan());
    println!("  {} <share_url|token>             Print the letter a link carries", "decode".cyan());
    println!("  {} <url>                           Composer or viewer?", "mode".cyan());
    println!("  {} <letter.json|share_url>       Show the reveal timeline", "render".cyan());
    println!("  {} <input> <output>            Downsample and re-encode an image", "compress".cyan());
    println!("  {} <image>                       Upload an image to the image host", "upload".cyan());
    println!("  {} <long_url>                   Get a short link", "shorten".cyan());
    println!("  {} <letter.json> <page_url>       Share a letter and save it to history", "share".cyan());
    println!("  {} [list|remove <id>|clear]    Manage saved letters", "history".cyan());
}

fn read_letter_file(path: &Path) -> anyhow::Result<LetterDocument> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
    let doc = serde_json::from_str(&raw)
        .map_err(|e| anyhow::anyhow!("{} is not a letter document: {}", path.display(), e))?;
    Ok(doc)
}

/// A share URL or a bare token.
fn letter_from_arg(arg: &str) -> Option<LetterDocument> {
    if arg.contains("letter=") {
        letter_from_url(arg)
    } else {
        decode_token(arg)
    }
}

fn load_letter(arg: &str) -> anyhow::Result<LetterDocument> {
    let path = Path::new(arg);
    if path.is_file() {
        return read_letter_file(path);
    }
    letter_from_arg(arg).ok_or_else(|| anyhow::anyhow!("Not a letter file or letter link: {}", arg))
}

fn show_render(doc: &LetterDocument, as_json: bool) -> anyhow::Result<()> {
    let rendered = render_letter(doc, 0.0);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&rendered)?);
        return Ok(());
    }

    println!(
        "{} {} at speed {} ({} chunks, {:.2}s)",
        "Mode:".bright_white().bold(),
        rendered.mode.to_string().cyan(),
        doc.speed(),
        rendered.chunk_count,
        rendered.total_duration()
    );
    if let Some(reveal) = rendered.reveal {
        println!("  whole body fades in over {:.2}s", reveal.duration);
        for fragment in &rendered.fragments {
            if let Fragment::Text { text } = fragment {
                println!("  {}", text);
            }
        }
        return Ok(());
    }
    for chunk in rendered.chunks() {
        println!(
            "  {:>4}  {:>6.2}s  {:?}",
            chunk.index.to_string().dimmed(),
            chunk.timing.delay,
            chunk.text
        );
    }
    Ok(())
}

async fn compress_file(config: &Config, input: &Path, output: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(input).await?;
    let before = bytes.len();
    let compressed = compress_image_async(bytes, CompressOptions::from_config(config)).await?;
    tokio::fs::write(output, &compressed.bytes).await?;
    println!(
        "{} {} -> {} ({}x{} {}, {} -> {} bytes)",
        "✓".green(),
        input.display(),
        output.display().to_string().cyan(),
        compressed.width,
        compressed.height,
        compressed.mime,
        before,
        compressed.bytes.len()
    );
    Ok(())
}

async fn upload_file(config: &Config, path: &Path) -> anyhow::Result<()> {
    let bytes = tokio::fs::read(path).await?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let host = ImgbbHost::from_config(config);
    match host.upload(&bytes, &filename).await {
        Some(url) => println!("{} {}", "✓".green(), url.cyan()),
        None => eprintln!(
            "{} Upload failed; the image would stay local-only",
            "✗".red().bold()
        ),
    }
    Ok(())
}

fn print_outcome(outcome: &ShortenOutcome) {
    match outcome {
        ShortenOutcome::Service(url) => println!("{} {}", "✓".green(), url.cyan()),
        ShortenOutcome::Legacy(url) => {
            println!("{} {} {}", "✓".green(), url.cyan(), "(legacy provider)".dimmed())
        }
        ShortenOutcome::LongUrl(url) => {
            eprintln!("{} Shortening unavailable, sharing the full link", "⚠".yellow());
            println!("{}", url);
        }
    }
}

fn open_history(config: &Config) -> anyhow::Result<LetterHistory> {
    std::fs::create_dir_all(&config.data_dir)?;
    Ok(LetterHistory::new(&config.data_dir)?)
}

async fn share(config: &Config, doc: LetterDocument, page_url: &str) -> anyhow::Result<()> {
    let history = open_history(config)?;
    let client = ShortLinkClient::from_config(config);
    let session = EditingSession::new(doc);
    let host = ImgbbHost::from_config(config);
    for (slot, outcome) in session.upload_local_previews(&host).await {
        match outcome {
            AttachOutcome::Hosted(url) => println!("{} {} uploaded to {}", "✓".green(), slot, url.cyan()),
            _ => eprintln!("{} {} is still local and will be left out", "⚠".yellow(), slot),
        }
    }
    let result = session.save_and_share(page_url, &client, &history).await?;
    print_outcome(&result.link);
    println!("  {} {}", "saved as".dimmed(), result.entry.id.dimmed());
    Ok(())
}

fn list_history(history: &LetterHistory) {
    let entries = history.load();
    if entries.is_empty() {
        println!("{}", "No saved letters".dimmed());
        return;
    }
    println!("{}", format!("Saved letters ({})", entries.len()).bright_white().bold());
    for entry in entries {
        println!("  {} {}", entry.id.cyan(), entry.created_at.dimmed());
        println!("    {} {}", entry.recipient.bright_white(), entry.excerpt);
        println!("    {}", entry.url.dimmed());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_from_arg_accepts_url_and_token() {
        let doc = LetterDocument {
            text: "<p>Hi</p>".to_string(),
            ..Default::default()
        };
        let token = encode_token(&doc);
        let url = share_url("https://post.example/", &doc);

        assert_eq!(letter_from_arg(&token).map(|d| d.text), Some("<p>Hi</p>".to_string()));
        assert_eq!(letter_from_arg(&url).map(|d| d.text), Some("<p>Hi</p>".to_string()));
        assert!(letter_from_arg("https://post.example/").is_none());
    }
}
