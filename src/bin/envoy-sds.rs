use anyhow::{bail, Context as _};
use envoy_sds::config::parse_duration;
use envoy_sds::constants::{
    CERTS_DIR_ENV, DEFAULT_CERTS_DIR, DEFAULT_ENDPOINT, DEFAULT_REFRESH_INTERVAL, ENDPOINT_ENV,
    REFRESH_ENV,
};
use envoy_sds::{DirCacheDelegate, SdsServer};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug)]
struct Args {
    endpoint: String,
    certs_dir: PathBuf,
    refresh: Duration,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let Some(args) = parse_args(env::args().skip(1))? else {
        print_usage();
        return Ok(());
    };

    let server = SdsServer::builder()
        .endpoint(&args.endpoint)
        .refresh_interval(args.refresh)
        .delegate(DirCacheDelegate::new(&args.certs_dir))
        .build()
        .context("invalid server configuration")?;

    log::info!(
        "Starting secret discovery server: endpoint={}, certs_dir={}, refresh={:?}",
        server.endpoint(),
        args.certs_dir.display(),
        args.refresh
    );

    server.serve().await.context("secret discovery server failed")
}

fn parse_args(mut argv: impl Iterator<Item = String>) -> anyhow::Result<Option<Args>> {
    let mut endpoint = env::var(ENDPOINT_ENV).ok();
    let mut certs_dir = env::var(CERTS_DIR_ENV).ok();
    let mut refresh = env::var(REFRESH_ENV).ok();

    while let Some(arg) = argv.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((flag, value)) => (flag.to_owned(), Some(value.to_owned())),
            None => (arg, None),
        };
        let slot = match flag.as_str() {
            "-h" | "--help" => return Ok(None),
            "--addr" => &mut endpoint,
            "--certs-dir" => &mut certs_dir,
            "--refresh" => &mut refresh,
            other => bail!("unknown argument: {other}\n\n{}", usage_text()),
        };
        let value = match inline {
            Some(value) => value,
            None => argv
                .next()
                .with_context(|| format!("missing value for {flag}"))?,
        };
        *slot = Some(value);
    }

    let refresh = match refresh {
        Some(value) => {
            parse_duration(&value).with_context(|| format!("invalid refresh interval {value:?}"))?
        }
        None => DEFAULT_REFRESH_INTERVAL,
    };

    Ok(Some(Args {
        endpoint: endpoint.unwrap_or_else(|| DEFAULT_ENDPOINT.to_owned()),
        certs_dir: PathBuf::from(certs_dir.unwrap_or_else(|| DEFAULT_CERTS_DIR.to_owned())),
        refresh,
    }))
}

fn print_usage() {
    eprintln!("{}", usage_text());
}

fn usage_text() -> &'static str {
    "Usage:
  envoy-sds [--addr <endpoint>] [--certs-dir <dir>] [--refresh <duration>]

Options:
  --addr <endpoint>     listen endpoint: socket path, unix:<path> or tcp:<ip>:<port>
                        (env ENVOY_SDS_ENDPOINT, default unix:/tmp/envoysds.sock)
  --certs-dir <dir>     certificate cache directory
                        (env ENVOY_SDS_CERTS_DIR, default autocerts)
  --refresh <duration>  refresh interval of open streams, e.g. 500ms, 20s, 5m, 1h
                        (env ENVOY_SDS_REFRESH, default 20s)
  -h, --help            print this help"
}
