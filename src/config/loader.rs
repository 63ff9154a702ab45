//! Site configuration loading.
//!
//! The configuration is line-oriented text. Blocks are separated by blank
//! lines; the first line of a block is a comma-separated address list and
//! every following line is one directive. `#` starts a comment.
//!
//! ```text
//! localhost:8080, example.com
//! root /var/www
//! gzip
//! ext .html .htm
//! ```

use crate::config::schema::{DirectiveSpec, Hook, SiteConfig, TlsSettings, DEFAULT_HOST};
use crate::middleware;
use std::path::PathBuf;
use thiserror::Error;

/// Error type for configuration loading and directive parsing.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("empty configuration")]
    Empty,

    #[error("line {line}: unknown directive '{name}'")]
    UnknownDirective { line: usize, name: String },

    #[error("line {line}: directive '{name}' {message}")]
    BadDirective { line: usize, name: String, message: String },

    #[error("invalid site address '{address}'")]
    BadAddress { address: String },

    #[error("could not resolve '{address}': {source}")]
    Resolve {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot mix TLS and non-TLS sites at {address}")]
    MixedTls { address: std::net::SocketAddr },
}

/// Parse a complete configuration into one `SiteConfig` per (address, host).
pub fn load(input: &str, default_port: u16) -> Result<Vec<SiteConfig>, ConfigError> {
    let mut sites = Vec::new();

    for block in blocks(input) {
        let (_, first_line) = block[0];
        let mut addresses = Vec::new();
        for part in first_line.split(',') {
            let part = part.trim();
            if part.is_empty() {
                return Err(ConfigError::BadAddress { address: first_line.to_string() });
            }
            addresses.push(parse_address(part, default_port)?);
        }

        // One prototype per block; cloned per address below.
        let mut proto = SiteConfig::new("", 0);
        for &(line_no, line) in &block[1..] {
            apply_directive(&mut proto, line_no, line)?;
        }
        proto.directives.sort_by_key(|d| middleware::order_of(&d.name));

        for (host, port) in addresses {
            let mut site = proto.clone();
            site.host = host;
            site.port = port;
            sites.push(site);
        }
    }

    if sites.is_empty() {
        return Err(ConfigError::Empty);
    }
    Ok(sites)
}

/// Parse a single directive line, as submitted by the admin API.
pub fn parse_directive(input: &str) -> Result<DirectiveSpec, ConfigError> {
    let line = input
        .lines()
        .map(strip_comment)
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or(ConfigError::Empty)?;

    let mut tokens = line.split_whitespace();
    let name = tokens.next().ok_or(ConfigError::Empty)?;
    let spec = DirectiveSpec::new(name, tokens.map(str::to_string).collect());
    validate_directive(&spec, 1)?;
    Ok(spec)
}

/// Split "host", "host:port", or ":port" into its parts, defaulting the
/// missing side. A string that does not split cleanly is treated as a bare
/// host.
pub fn split_host_port(address: &str, default_port: u16) -> (String, u16) {
    if let Some(rest) = address.strip_prefix('[') {
        // Bracketed IPv6: "[::1]:8080" or "[::1]".
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail.strip_prefix(':').and_then(|p| p.parse().ok()).unwrap_or(default_port);
            return (host.to_string(), port);
        }
        return (address.to_string(), default_port);
    }
    if address.matches(':').count() > 1 {
        // Unbracketed IPv6 literal; the whole string is the host.
        return (address.to_string(), default_port);
    }
    match address.rsplit_once(':') {
        Some((host, port)) => match port.parse() {
            Ok(port) => (host.to_string(), port),
            Err(_) => (address.to_string(), default_port),
        },
        None => (address.to_string(), default_port),
    }
}

fn parse_address(part: &str, default_port: u16) -> Result<(String, u16), ConfigError> {
    if let Some(port) = part.strip_prefix(':') {
        let port = port
            .parse()
            .map_err(|_| ConfigError::BadAddress { address: part.to_string() })?;
        return Ok((DEFAULT_HOST.to_string(), port));
    }
    let (host, port) = split_host_port(part, default_port);
    if host.is_empty() {
        return Err(ConfigError::BadAddress { address: part.to_string() });
    }
    Ok((host, port))
}

fn apply_directive(site: &mut SiteConfig, line_no: usize, line: &str) -> Result<(), ConfigError> {
    let mut tokens = line.split_whitespace();
    let name = match tokens.next() {
        Some(name) => name,
        None => return Ok(()),
    };
    let args: Vec<String> = tokens.map(str::to_string).collect();

    match name {
        "root" => {
            expect_args(name, &args, line_no, 1, "takes exactly one path")?;
            site.root = PathBuf::from(&args[0]);
        }
        "tls" => {
            expect_args(name, &args, line_no, 2, "takes a certificate and a key")?;
            site.tls = tls_from_args(&args);
        }
        "startup" => {
            require_args(name, &args, line_no, "needs a command")?;
            site.startup.push(Hook::command(args.join(" ")));
        }
        "shutdown" => {
            require_args(name, &args, line_no, "needs a command")?;
            site.shutdown.push(Hook::command(args.join(" ")));
        }
        _ => {
            let spec = DirectiveSpec::new(name, args);
            validate_directive(&spec, line_no)?;
            // Later declarations of the same directive win.
            site.directives.retain(|d| d.name != spec.name);
            site.directives.push(spec);
        }
    }
    Ok(())
}

/// Check a chain directive's name and argument shape.
fn validate_directive(spec: &DirectiveSpec, line_no: usize) -> Result<(), ConfigError> {
    match spec.name.as_str() {
        "log" | "gzip" => expect_args(&spec.name, &spec.args, line_no, 0, "takes no arguments"),
        "basicauth" => {
            expect_args(&spec.name, &spec.args, line_no, 2, "takes a username and a password")
        }
        "ext" => require_args(&spec.name, &spec.args, line_no, "needs at least one extension"),
        "tls" => expect_args(&spec.name, &spec.args, line_no, 2, "takes a certificate and a key"),
        _ => Err(ConfigError::UnknownDirective { line: line_no, name: spec.name.clone() }),
    }
}

/// Build TLS settings from the arguments of a `tls` directive.
pub fn tls_from_args(args: &[String]) -> TlsSettings {
    TlsSettings {
        enabled: true,
        certificate: PathBuf::from(&args[0]),
        key: PathBuf::from(&args[1]),
        ..TlsSettings::default()
    }
}

fn expect_args(
    name: &str,
    args: &[String],
    line: usize,
    want: usize,
    message: &str,
) -> Result<(), ConfigError> {
    if args.len() == want {
        Ok(())
    } else {
        Err(ConfigError::BadDirective {
            line,
            name: name.to_string(),
            message: message.to_string(),
        })
    }
}

fn require_args(name: &str, args: &[String], line: usize, message: &str) -> Result<(), ConfigError> {
    if args.is_empty() {
        Err(ConfigError::BadDirective {
            line,
            name: name.to_string(),
            message: message.to_string(),
        })
    } else {
        Ok(())
    }
}

fn strip_comment(line: &str) -> &str {
    match line.find('#') {
        Some(i) => &line[..i],
        None => line,
    }
}

/// Group non-blank lines into blocks, keeping 1-based line numbers.
fn blocks(input: &str) -> Vec<Vec<(usize, &str)>> {
    let mut out: Vec<Vec<(usize, &str)>> = Vec::new();
    let mut current: Vec<(usize, &str)> = Vec::new();
    for (i, raw) in input.lines().enumerate() {
        let line = strip_comment(raw).trim();
        if line.is_empty() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
        } else {
            current.push((i + 1, line));
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}
