//! igzread - print any byte range of a plain or gzip file.

use anyhow::{Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use igzread::{IndexConfig, SharedIndexedFile};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Bytes requested per read while streaming to stdout
const COPY_CHUNK: u64 = 1024 * 1024;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let matches = Command::new("igzread")
        .version(igzread::VERSION)
        .about("Random-access reads over plain and gzip files")
        .long_about(
            "igzread prints a byte range of a file to stdout. Gzip files are decompressed \
             through a seek index, so offsets deep into large archives are reached without \
             decoding everything before them.",
        )
        .arg(
            Arg::new("file")
                .help("Path to the file to read")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .index(1),
        )
        .arg(
            Arg::new("offset")
                .long("offset")
                .short('o')
                .help("Logical offset of the first byte")
                .value_parser(value_parser!(u64))
                .default_value("0"),
        )
        .arg(
            Arg::new("length")
                .long("length")
                .short('n')
                .help("Number of bytes to print (default: to the end)")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("info")
                .long("info")
                .help("Print format, sizes and index statistics instead of content")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("build-index")
                .long("build-index")
                .help("Index the whole gzip stream before reading")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .help("TOML file with index parameters")
                .value_parser(value_parser!(PathBuf)),
        )
        .get_matches();

    let path = matches
        .get_one::<PathBuf>("file")
        .context("file argument is required")?;
    let config = load_config(matches.get_one::<PathBuf>("config"))?;

    let file = SharedIndexedFile::open_with_config(path, config)
        .with_context(|| format!("Cannot open {}", path.display()))?;

    if matches.get_flag("build-index") {
        file.build_full_index()
            .with_context(|| format!("Cannot index {}", path.display()))?;
    }

    if matches.get_flag("info") {
        print_info(&file, path);
    } else {
        copy_range(&file, &matches).await?;
    }

    if let Ok(handle) = file.try_into_inner() {
        handle.close();
    }
    Ok(())
}

#[cfg(feature = "config")]
fn load_config(path: Option<&PathBuf>) -> Result<IndexConfig> {
    let config = match path {
        Some(path) => IndexConfig::load(path)?,
        None => IndexConfig::load_default()?,
    };
    Ok(config)
}

#[cfg(not(feature = "config"))]
fn load_config(path: Option<&PathBuf>) -> Result<IndexConfig> {
    if let Some(path) = path {
        anyhow::bail!(
            "Cannot load {}: built without the `config` feature",
            path.display()
        );
    }
    Ok(IndexConfig::default())
}

fn print_info(file: &SharedIndexedFile, path: &Path) {
    println!("file:        {}", path.display());
    println!("format:      {}", file.format().name());
    println!("on disk:     {}", file.compressed_size());
    match file.logical_size() {
        Some(size) => println!("size:        {}", size),
        None => println!("size:        unknown (use --build-index)"),
    }
    println!("checkpoints: {}", file.checkpoint_count());
}

async fn copy_range(file: &SharedIndexedFile, matches: &ArgMatches) -> Result<()> {
    let mut offset = matches.get_one::<u64>("offset").copied().unwrap_or(0);
    let mut remaining = matches
        .get_one::<u64>("length")
        .copied()
        .unwrap_or(i64::MAX as u64);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while remaining > 0 {
        let chunk = file
            .read_async(remaining.min(COPY_CHUNK), offset)
            .await
            .with_context(|| format!("Read at offset {} failed", offset))?;
        if chunk.is_empty() {
            break;
        }
        out.write_all(&chunk).context("Cannot write to stdout")?;
        offset += chunk.len() as u64;
        remaining -= chunk.len() as u64;
    }
    out.flush().context("Cannot write to stdout")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_version_constant() {
        assert!(!igzread::VERSION.is_empty());
    }
}
