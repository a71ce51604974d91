//! routio-router — the message routing daemon.
//!
//! Usage:
//! ```text
//! routio-router <socket-path>    # UNIX-domain socket
//! routio-router -i <port>        # TCP on 127.0.0.1
//! ```
//!
//! Runs until SIGINT/SIGTERM (exit 0); exits non-zero if the endpoint
//! cannot be bound.

use std::time::Duration;

use anyhow::{bail, Context, Result};

use routio::transport::Endpoint;
use routio::{IoLoop, Router};

fn parse_endpoint(args: &[String]) -> Result<Endpoint> {
    match args {
        [path] if path != "-i" => Ok(Endpoint::unix(path)),
        [flag, port] if flag == "-i" => {
            let port: u16 = port.parse().with_context(|| format!("invalid port: {port}"))?;
            Ok(Endpoint::tcp(port))
        }
        _ => bail!("usage: routio-router <socket-path> | routio-router -i <port>"),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let endpoint = parse_endpoint(&args)?;

    let io = IoLoop::new().context("failed to create I/O loop")?;
    let router = Router::bind(&io, &endpoint)
        .with_context(|| format!("failed to bind {endpoint}"))?;

    while io.wait(Duration::from_millis(5000)) {
        router.log_statistics();
    }

    tracing::info!("termination signal observed, shutting down");
    router.shutdown(&io);
    io.wait(Duration::from_millis(100));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unix_endpoint() {
        let endpoint = parse_endpoint(&["/tmp/r.sock".to_string()]).unwrap();
        assert_eq!(endpoint, Endpoint::unix("/tmp/r.sock"));
    }

    #[test]
    fn test_parse_tcp_endpoint() {
        let endpoint = parse_endpoint(&["-i".to_string(), "9000".to_string()]).unwrap();
        assert_eq!(endpoint, Endpoint::tcp(9000));
    }

    #[test]
    fn test_missing_args_rejected() {
        assert!(parse_endpoint(&[]).is_err());
        assert!(parse_endpoint(&["-i".to_string()]).is_err());
        assert!(parse_endpoint(&["-i".to_string(), "not-a-port".to_string()]).is_err());
    }
}
