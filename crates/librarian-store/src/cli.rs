//! Operator command line.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::blob_id::BlobId;
use crate::catalogue::InMemoryCatalogue;
use crate::config::LibrarianConfig;
use crate::digest::{parse_sha1_hex, Digester};
use crate::librarian::{Librarian, Namespace};
use crate::upload::UploadRequest;

/// Command-line interface of the `librarian` binary.
#[derive(Parser)]
#[command(name = "librarian")]
#[command(about = "Librarian blob store CLI", long_about = None)]
pub struct Cli {
    /// Configuration file (TOML or JSON).
    #[arg(short, long, env = "LIBRARIAN_CONFIG")]
    pub config: Option<PathBuf>,

    /// Operate on the restricted namespace.
    #[arg(long)]
    pub restricted: bool,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand)]
pub enum Command {
    /// Store a file and print its identity.
    Put {
        /// File to upload.
        file: PathBuf,
        /// Filename recorded on the alias; defaults to the file's own name.
        #[arg(short, long)]
        name: Option<String>,
        /// MIME type recorded on the alias.
        #[arg(long)]
        content_type: Option<String>,
        /// Expected SHA-1, hex encoded.
        #[arg(long)]
        sha1: Option<String>,
    },
    /// Write a blob to stdout or a file.
    Get {
        /// Blob identity.
        id: BlobId,
        /// Destination file; stdout when absent.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Read chunk size in bytes; the configured size when absent.
        #[arg(long)]
        chunk_size: Option<usize>,
    },
    /// Print the local path a blob is stored at.
    Path {
        /// Blob identity.
        id: BlobId,
    },
    /// List every blob committed on local disk.
    Ls,
    /// Read a blob through every tier and print its digests.
    Check {
        /// Blob identity.
        id: BlobId,
    },
}

const PUT_CHUNK_SIZE: usize = 64 * 1024;

impl Cli {
    fn namespace(&self) -> Namespace {
        if self.restricted {
            Namespace::Restricted
        } else {
            Namespace::Public
        }
    }

    fn load_config(&self) -> Result<LibrarianConfig> {
        match &self.config {
            Some(path) => LibrarianConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display())),
            None => {
                tracing::warn!("no config file given, using defaults");
                Ok(LibrarianConfig::default())
            }
        }
    }

    /// Runs the selected subcommand.
    pub async fn run(self) -> Result<()> {
        let config = self.load_config()?;
        let librarian = Librarian::from_config(&config).await?;
        let namespace = self.namespace();

        match self.command {
            Command::Put {
                ref file,
                ref name,
                ref content_type,
                ref sha1,
            } => {
                put(
                    &librarian,
                    namespace,
                    file,
                    name.clone(),
                    content_type.clone(),
                    sha1.as_deref(),
                )
                .await
            }
            Command::Get {
                id,
                ref output,
                chunk_size,
            } => get(&librarian, namespace, id, output.as_deref(), chunk_size).await,
            Command::Path { id } => path(&librarian, namespace, id).await,
            Command::Ls => ls(&librarian, namespace),
            Command::Check { id } => check(&librarian, namespace, id).await,
        }
    }
}

async fn put(
    librarian: &Librarian,
    namespace: Namespace,
    file: &Path,
    name: Option<String>,
    content_type: Option<String>,
    sha1: Option<&str>,
) -> Result<()> {
    let local = librarian.local(namespace)?;
    let next_id = local
        .committed_ids()?
        .last()
        .map(|id| u64::from(id.get()) + 1)
        .unwrap_or(1);
    let catalogue = InMemoryCatalogue::starting_at(librarian.database_name(), next_id);

    let mut source = tokio::fs::File::open(file)
        .await
        .with_context(|| format!("opening {}", file.display()))?;
    let size = source.metadata().await?.len();

    let filename = name.or_else(|| {
        file.file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
    });
    let mut request = UploadRequest::new(size).with_database_name(librarian.database_name());
    if let Some(filename) = filename {
        request = request.with_filename(filename);
    }
    if let Some(content_type) = content_type {
        request = request.with_content_type(content_type);
    }
    if let Some(sha1) = sha1 {
        request = request.with_sha1(parse_sha1_hex(sha1)?);
    }

    let mut upload = librarian.begin_upload(namespace, request).await?;
    let mut buf = vec![0u8; PUT_CHUNK_SIZE];
    loop {
        let n = source.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        upload.append(&buf[..n]).await?;
    }
    let stored = upload.store(&catalogue).await?;

    println!("id: {}", stored.id);
    if let Some(alias) = stored.alias {
        println!("alias: {}", alias);
    }
    println!("size: {}", stored.size);
    println!("sha256: {}", stored.digests.sha256_hex());
    println!("path: {}", stored.path.display());
    Ok(())
}

async fn get(
    librarian: &Librarian,
    namespace: Namespace,
    id: BlobId,
    output: Option<&Path>,
    chunk_size: Option<usize>,
) -> Result<()> {
    let chunk_size = chunk_size.unwrap_or_else(|| librarian.read_chunk_size()).max(1);
    let mut reader = librarian.open(namespace, id).await?;

    let mut sink: Box<dyn tokio::io::AsyncWrite + Unpin + Send> = match output {
        Some(path) => Box::new(
            tokio::fs::File::create(path)
                .await
                .with_context(|| format!("creating {}", path.display()))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };
    loop {
        let chunk = reader.read(chunk_size).await?;
        if chunk.is_empty() {
            break;
        }
        sink.write_all(&chunk).await?;
    }
    sink.flush().await?;
    tracing::debug!(id = %id, tier = %reader.tier(), "blob written");
    Ok(())
}

async fn path(librarian: &Librarian, namespace: Namespace, id: BlobId) -> Result<()> {
    let path = librarian.local(namespace)?.path_for(id);
    if !librarian.exists_locally(namespace, id).await? {
        anyhow::bail!("blob {} is not stored locally (expected at {})", id, path.display());
    }
    println!("{}", path.display());
    Ok(())
}

fn ls(librarian: &Librarian, namespace: Namespace) -> Result<()> {
    for id in librarian.local(namespace)?.committed_ids()? {
        println!("{}", id);
    }
    Ok(())
}

async fn check(librarian: &Librarian, namespace: Namespace, id: BlobId) -> Result<()> {
    let mut reader = librarian.open(namespace, id).await?;
    let mut digester = Digester::new();
    loop {
        let chunk = reader.read(librarian.read_chunk_size()).await?;
        if chunk.is_empty() {
            break;
        }
        digester.update(&chunk);
    }
    let size = digester.bytes();
    let digests = digester.finalize();

    println!("id: {}", id);
    println!("tier: {}", reader.tier());
    println!("size: {}", size);
    println!("md5: {}", digests.md5_hex());
    println!("sha1: {}", digests.sha1_hex());
    println!("sha256: {}", digests.sha256_hex());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_put() {
        let cli = Cli::parse_from([
            "librarian",
            "--restricted",
            "put",
            "/tmp/a.txt",
            "--name",
            "b.txt",
            "--sha1",
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed",
        ]);
        assert!(cli.restricted);
        assert_eq!(cli.namespace(), Namespace::Restricted);
        match cli.command {
            Command::Put {
                file, name, sha1, ..
            } => {
                assert_eq!(file, PathBuf::from("/tmp/a.txt"));
                assert_eq!(name.as_deref(), Some("b.txt"));
                assert!(sha1.is_some());
            }
            _ => panic!("expected put"),
        }
    }

    #[test]
    fn test_parse_get_with_id() {
        let cli = Cli::parse_from(["librarian", "get", "42", "--chunk-size", "10"]);
        assert_eq!(cli.namespace(), Namespace::Public);
        match cli.command {
            Command::Get { id, chunk_size, output } => {
                assert_eq!(id, BlobId::new(42));
                assert_eq!(chunk_size, Some(10));
                assert!(output.is_none());
            }
            _ => panic!("expected get"),
        }
    }

    #[test]
    fn test_parse_rejects_bad_id() {
        assert!(Cli::try_parse_from(["librarian", "path", "4294967296"]).is_err());
    }
}
