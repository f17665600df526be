//! Script Blocker CLI
//!
//! CLI tool for checking site rules against pages, scanning scripts for
//! blocked keywords and maintaining configuration files.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};

use sb_config::{load_with_retry, ConfigError, ConfigSource, HandoffSlices, RawConfig, RetryPolicy, Sleep};
use sb_core::resolver::resolve_with;
use sb_core::{
    ContentInspector, HookSet, InstallOptions, MergePolicy, PageContext, Resolution, SkipReason, Surface,
};

#[derive(Parser)]
#[command(name = "sb-cli")]
#[command(about = "Script Blocker rule and configuration tools")]
struct Cli {
    /// Retry reading the configuration file on failure
    #[arg(long, global = true)]
    retry: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a configuration resolves for a page
    Resolve {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Page URL
        #[arg(short, long)]
        url: String,

        /// Page host (taken from the URL when omitted)
        #[arg(long)]
        host: Option<String>,

        /// Only the first matching rule contributes keywords
        #[arg(long)]
        first_match: bool,

        /// Do not merge the built-in whitelists
        #[arg(long)]
        no_builtin: bool,
    },

    /// Scan script files for the keywords blocked on a page
    Scan {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,

        /// Page URL
        #[arg(short, long)]
        url: String,

        /// Script files
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Upgrade legacy rule records
    Migrate {
        /// Configuration file to migrate
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the page metadata elements carrying a configuration
    Handoff {
        /// Configuration file
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Configuration file read with the same retrying contract as the extension.
struct FileSource {
    path: PathBuf,
}

impl ConfigSource for FileSource {
    async fn fetch(&self) -> Result<RawConfig, ConfigError> {
        let text = tokio::fs::read_to_string(&self.path).await?;
        RawConfig::from_json(&text)
    }
}

struct TokioSleep;

impl Sleep for TokioSleep {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let policy = if cli.retry {
        RetryPolicy::default()
    } else {
        RetryPolicy::none()
    };

    let result = match cli.command {
        Commands::Resolve {
            config,
            url,
            host,
            first_match,
            no_builtin,
        } => {
            let options = InstallOptions {
                merge_policy: if first_match {
                    MergePolicy::FirstMatch
                } else {
                    MergePolicy::Union
                },
                builtin_whitelists: !no_builtin,
                ..InstallOptions::default()
            };
            cmd_resolve(&config, &url, host.as_deref(), options, &policy).await
        }
        Commands::Scan { config, url, files } => cmd_scan(&config, &url, &files, &policy).await,
        Commands::Migrate { input, output } => cmd_migrate(&input, output.as_deref(), &policy).await,
        Commands::Handoff { config } => cmd_handoff(&config, &policy).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn load_config(path: &Path, policy: &RetryPolicy) -> Result<RawConfig, String> {
    let source = FileSource {
        path: path.to_path_buf(),
    };
    let outcome = load_with_retry(&source, &TokioSleep, policy).await;
    if let Some(e) = outcome.last_error.filter(|_| outcome.fell_back) {
        return Err(format!("Failed to read '{}': {}", path.display(), e));
    }
    if outcome.attempts > 1 {
        log::warn!("read '{}' only after {} attempts", path.display(), outcome.attempts);
    }
    log::debug!("loaded {} rules from '{}'", outcome.config.rules.len(), path.display());
    Ok(outcome.config)
}

fn page_context(url: &str, host: Option<&str>) -> PageContext {
    match host {
        Some(host) => PageContext::new(url, host.to_ascii_lowercase()),
        None => PageContext::from_url(url),
    }
}

fn describe_skip(reason: &SkipReason) -> String {
    match reason {
        SkipReason::GlobalWhitelist(pattern) => format!("global whitelist pattern '{}'", pattern),
        SkipReason::NoMatchingRule => "no enabled rule matches".to_string(),
        SkipReason::NoKeywords => "matching rules carry no keywords".to_string(),
    }
}

async fn cmd_resolve(
    config_path: &Path,
    url: &str,
    host: Option<&str>,
    options: InstallOptions,
    policy: &RetryPolicy,
) -> Result<(), String> {
    let config = load_config(config_path, policy).await?;
    let page = page_context(url, host);
    let resolver_options = sb_core::ResolverOptions {
        merge_policy: options.merge_policy,
        builtin_whitelists: options.builtin_whitelists,
    };
    let resolution = resolve_with(&page, &config.to_filter_config(), &resolver_options);

    println!("Page: {} (host '{}')", page.url, page.host);
    match &resolution {
        Resolution::Skip(reason) => {
            println!("  Filtering:   off ({})", describe_skip(reason));
        }
        Resolution::Active(policy) => {
            println!("  Filtering:   {}", if policy.partial { "partial" } else { "full" });
            println!("  Rules:       {}", policy.matched_rules.join(", "));
            println!("  Keywords:    {} ({})", policy.keywords.len(), policy.keywords.iter().collect::<Vec<_>>().join(", "));
        }
    }
    let hooks: HookSet = options.required_hooks(&resolution);
    println!("  Hooks:       {}", hooks.names().join(", "));

    Ok(())
}

async fn cmd_scan(config_path: &Path, url: &str, files: &[PathBuf], policy: &RetryPolicy) -> Result<(), String> {
    let config = load_config(config_path, policy).await?;
    let page = PageContext::from_url(url);
    let resolution = sb_core::resolve(&page, &config.to_filter_config());

    let active = match &resolution {
        Resolution::Skip(reason) => {
            println!("Page '{}' is not filtered ({})", url, describe_skip(reason));
            return Ok(());
        }
        Resolution::Active(active) => active,
    };

    let inspector = ContentInspector::new(&active.keywords);
    let mut blocked = 0usize;
    for path in files {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read '{}': {}", path.display(), e))?;

        match inspector.inspect_text(&content, Surface::TextContent) {
            Some(finding) => {
                blocked += 1;
                println!("  {}: blocked (keyword {:?})", path.display(), finding.keyword);
            }
            None => println!("  {}: clean", path.display()),
        }
        log::debug!("scanned '{}' ({} bytes)", path.display(), content.len());
    }

    println!("Scanned {} files, {} blocked", files.len(), blocked);
    Ok(())
}

async fn cmd_migrate(input: &Path, output: Option<&Path>, policy: &RetryPolicy) -> Result<(), String> {
    let mut config = load_config(input, policy).await?;
    let changed = config.migrate();
    let json = config
        .to_json_pretty()
        .map_err(|e| format!("Failed to serialize configuration: {}", e))?;

    match output {
        Some(path) => {
            tokio::fs::write(path, json.as_bytes())
                .await
                .map_err(|e| format!("Failed to write '{}': {}", path.display(), e))?;
            println!(
                "Migrated {} rules to '{}'{}",
                config.rules.len(),
                path.display(),
                if changed { "" } else { " (already current)" }
            );
        }
        None => {
            println!("{}", json);
            if !changed {
                log::info!("configuration already current");
            }
        }
    }

    Ok(())
}

async fn cmd_handoff(config_path: &Path, policy: &RetryPolicy) -> Result<(), String> {
    let config = load_config(config_path, policy).await?;
    let slices = HandoffSlices::encode(&config).map_err(|e| format!("Failed to encode configuration: {}", e))?;
    println!("{}", slices.to_meta_html());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_context_host_override() {
        let page = page_context("https://www.example.com/a", Some("Example.COM"));
        assert_eq!(page.host, "example.com");
        assert_eq!(page_context("https://www.example.com/a", None).host, "www.example.com");
    }

    #[tokio::test]
    async fn test_load_config_reports_missing_file() {
        let path = std::env::temp_dir().join("sb-cli-missing-config.json");
        let err = load_config(&path, &RetryPolicy::none()).await.unwrap_err();
        assert!(err.starts_with("Failed to read"));
    }

    #[tokio::test]
    async fn test_load_config_reads_file() {
        let path = std::env::temp_dir().join(format!("sb-cli-config-{}.json", std::process::id()));
        tokio::fs::write(&path, r#"{"rules": [{"name": "ads", "enabled": true}], "globalWhitelist": ["x.org"]}"#)
            .await
            .unwrap();
        let config = load_config(&path, &RetryPolicy::none()).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.global_whitelist, vec!["x.org".to_string()]);
    }
}
