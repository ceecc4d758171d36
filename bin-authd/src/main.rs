use bytes::BytesMut;
use clap::Parser;
use rand::Rng;
use std::collections::HashSet;
use std::env;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::process;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use dns_auth::context::ServerContext;
use dns_auth::processor::{
    ConsumeOutcome, ProduceOutcome, Protocol, ServerEvent, Transaction, TransactionParams,
};
use dns_types::protocol::types::*;

mod metrics;
mod settings;

use metrics::*;
use settings::Settings;

const DNS_PORT: u16 = 53;

/// The live context, swapped wholesale on reload.  Transactions hold
/// the `Arc` they started with, so a reload never changes the rules
/// mid-query.
type SharedContext = Arc<RwLock<Arc<ServerContext>>>;

/// Read a DNS message from a TCP stream.
///
/// A DNS TCP message is slightly different to a DNS UDP message: it
/// has a big-endian u16 prefix giving the total length of the
/// message.  This is redundant (since the header is fixed-size and
/// says how many fields there are, and the fields contain length
/// information), but it means the entire message can be read before
/// parsing begins.
async fn read_tcp_bytes(stream: &mut TcpStream) -> io::Result<BytesMut> {
    let size = stream.read_u16().await?;
    let expected = size as usize;
    let mut bytes = BytesMut::with_capacity(expected);
    while bytes.len() < expected {
        if stream.read_buf(&mut bytes).await? == 0 && bytes.len() < expected {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed mid-message",
            ));
        }
    }
    Ok(bytes)
}

/// Write a serialised message to a TCP stream, with the two-octet
/// length prefix.
async fn send_tcp_bytes(stream: &mut TcpStream, bytes: &[u8]) -> io::Result<()> {
    let len = u16::try_from(bytes.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "response over 64KiB"))?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(bytes).await?;
    Ok(())
}

fn count_response(wire: &[u8]) {
    if wire.len() >= 4 {
        let rcode = Rcode::from(u16::from(wire[3] & 0b0000_1111));
        DNS_RESPONSES_TOTAL
            .with_label_values(&[&rcode.to_string()])
            .inc();
    }
}

/// Act on what a transaction left behind: NOTIFY fan-out after an
/// update, refresh bookkeeping after a NOTIFY from a primary.
async fn handle_events(ctx: &Arc<ServerContext>, events: Vec<ServerEvent>) {
    for event in events {
        match event {
            ServerEvent::ZoneUpdated { apex } => {
                ZONE_UPDATES_TOTAL.inc();
                send_notifies(ctx, &apex).await;
            }
            ServerEvent::RefreshRequested { apex } => {
                // this server is a primary: a NOTIFY is
                // acknowledged but there is no transfer to schedule
                tracing::info!(zone = %apex.to_dotted_string(), "refresh requested");
            }
        }
    }
}

/// Tell the configured secondaries the zone changed (RFC 1996).
/// Fire-and-forget: a lost NOTIFY only delays the next refresh.
async fn send_notifies(ctx: &Arc<ServerContext>, apex: &DomainName) {
    let Some(policy) = ctx.policy(apex) else { return };

    for target in policy.notify_targets.clone() {
        let mut message = Message::from_question(
            rand::thread_rng().gen(),
            Question {
                name: apex.clone(),
                qtype: QueryType::Record(RecordType::SOA),
                qclass: RecordClass::IN,
            },
        );
        message.header.opcode = Opcode::Notify;
        message.header.is_authoritative = true;

        let Ok(wire) = message.to_octets() else { return };
        tokio::spawn(async move {
            match UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await {
                Ok(socket) => match socket.send_to(&wire, target).await {
                    Ok(_) => NOTIFY_SENT_TOTAL.inc(),
                    Err(error) => tracing::debug!(?target, ?error, "NOTIFY send error"),
                },
                Err(error) => tracing::debug!(?error, "NOTIFY socket error"),
            }
        });
    }
}

async fn listen_udp_task(shared: SharedContext, socket: UdpSocket) {
    let socket = Arc::new(socket);
    let mut buf = vec![0u8; 4096];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((size, peer)) => {
                DNS_REQUESTS_TOTAL.with_label_values(&["udp"]).inc();
                let wire = buf[..size].to_vec();
                let ctx = shared.read().await.clone();
                let socket = socket.clone();

                tokio::spawn(async move {
                    let mut transaction = Transaction::begin(
                        ctx.clone(),
                        TransactionParams {
                            protocol: Protocol::Udp,
                            source: peer,
                        },
                    );

                    match transaction.consume(&wire) {
                        ConsumeOutcome::Full => {
                            // a UDP transaction only ever produces
                            // one chunk
                            let mut out = Vec::new();
                            match transaction.produce(&mut out, MESSAGE_MAX_LEN) {
                                ProduceOutcome::Done | ProduceOutcome::Full
                                    if !out.is_empty() =>
                                {
                                    count_response(&out);
                                    if let Err(error) = socket.send_to(&out, peer).await {
                                        tracing::debug!(?peer, ?error, "UDP send error");
                                    }
                                }
                                _ => DNS_DROPPED_TOTAL.inc(),
                            }
                        }
                        ConsumeOutcome::More | ConsumeOutcome::NoOp => DNS_DROPPED_TOTAL.inc(),
                    }

                    let events = transaction.finish();
                    handle_events(&ctx, events).await;
                });
            }
            Err(error) => tracing::debug!(?error, "UDP recv error"),
        }
    }
}

async fn handle_tcp_connection(shared: SharedContext, mut stream: TcpStream, peer: SocketAddr) {
    let ctx = shared.read().await.clone();
    let mut transaction = Transaction::begin(
        ctx.clone(),
        TransactionParams {
            protocol: Protocol::Tcp,
            source: peer,
        },
    );

    // one connection can carry many queries back to back
    loop {
        let bytes = match read_tcp_bytes(&mut stream).await {
            Ok(bytes) => bytes,
            Err(error) => {
                if error.kind() != io::ErrorKind::UnexpectedEof {
                    tracing::debug!(?peer, ?error, "TCP read error");
                }
                break;
            }
        };

        match transaction.consume(bytes.as_ref()) {
            ConsumeOutcome::Full => loop {
                let mut out = Vec::new();
                match transaction.produce(&mut out, MESSAGE_MAX_LEN) {
                    ProduceOutcome::Full => {
                        count_response(&out);
                        if send_tcp_bytes(&mut stream, &out).await.is_err() {
                            return;
                        }
                    }
                    ProduceOutcome::Done => {
                        if !out.is_empty() {
                            count_response(&out);
                            if let Err(error) = send_tcp_bytes(&mut stream, &out).await {
                                tracing::debug!(?peer, ?error, "TCP send error");
                            }
                        }
                        break;
                    }
                    ProduceOutcome::Fail => return,
                }
            },
            ConsumeOutcome::More => continue,
            ConsumeOutcome::NoOp => break,
        }

        let events = transaction.take_events();
        handle_events(&ctx, events).await;
        transaction.reset();
    }

    let events = transaction.finish();
    handle_events(&ctx, events).await;
}

async fn listen_tcp_task(shared: SharedContext, socket: TcpListener) {
    loop {
        match socket.accept().await {
            Ok((stream, peer)) => {
                tracing::debug!(?peer, "TCP connection");
                DNS_REQUESTS_TOTAL.with_label_values(&["tcp"]).inc();
                tokio::spawn(handle_tcp_connection(shared.clone(), stream, peer));
            }
            Err(error) => tracing::debug!(?error, "TCP accept error"),
        }
    }
}

/// Reload settings and swap in a new context.
async fn reload_task(shared: SharedContext, args: Args) {
    let mut stream = match signal(SignalKind::user_defined1()) {
        Ok(stream) => stream,
        Err(error) => {
            tracing::error!(?error, "could not subscribe to SIGUSR1");
            process::exit(1);
        }
    };

    loop {
        stream.recv().await;

        tracing::info!("SIGUSR1 received, reloading");
        let start = Instant::now();
        match Settings::new(&args.config).map_err(|error| error.to_string()) {
            Ok(settings) => match settings.build_context() {
                Ok(ctx) => {
                    *shared.write().await = Arc::new(ctx);
                    tracing::info!(duration_seconds = %start.elapsed().as_secs_f64(), "reload done");
                }
                Err(error) => {
                    tracing::error!(%error, "reload failed, keeping old configuration");
                }
            },
            Err(error) => {
                tracing::error!(%error, "could not read configuration");
            }
        }
    }
}

fn begin_logging() {
    let log_format = if let Ok(var) = env::var("RUST_LOG_FORMAT") {
        let mut set = HashSet::new();
        for s in var.split(',') {
            set.insert(s.to_string());
        }
        set
    } else {
        HashSet::new()
    };

    let logger = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(!log_format.contains("no-ansi"));

    if log_format.contains("json") {
        if log_format.contains("no-time") {
            logger.json().without_time().init();
        } else {
            logger.json().init();
        }
    } else if log_format.contains("pretty") {
        if log_format.contains("no-time") {
            logger.pretty().without_time().init();
        } else {
            logger.pretty().init();
        }
    } else if log_format.contains("compact") {
        if log_format.contains("no-time") {
            logger.compact().without_time().init();
        } else {
            logger.compact().init();
        }
    } else if log_format.contains("no-time") {
        logger.without_time().init();
    } else {
        logger.init();
    }
}

// the doc comments for this struct turn into the CLI help text
#[derive(Debug, Parser, Clone)]
/// An authoritative DNS server.
///
/// authd serves the zones named in its configuration file, and
/// nothing else: no recursion, no cache, no forwarding.  It speaks
/// DNS over UDP and TCP, answers zone transfers (AXFR and IXFR),
/// accepts TSIG-signed dynamic updates, and notifies secondaries when
/// a zone changes.
///
/// SIGUSR1 reloads the configuration file; queries in flight finish
/// against the configuration they started with.
///
/// Prometheus metrics are served at
/// "http://{metrics_interface}:{metrics_port}/metrics"
struct Args {
    /// Path to the configuration file
    #[clap(short, long, value_parser, default_value = "authd.yaml")]
    config: String,

    /// Interface to listen on (overrides the configuration file)
    #[clap(short, long, value_parser)]
    interface: Option<IpAddr>,

    /// Port to listen on
    #[clap(short, long, value_parser)]
    port: Option<u16>,

    /// Interface to listen on to serve Prometheus metrics
    #[clap(long, value_parser, default_value_t = IpAddr::V4(Ipv4Addr::LOCALHOST))]
    metrics_interface: IpAddr,

    /// Port to listen on to serve Prometheus metrics
    #[clap(long, value_parser, default_value_t = 9420)]
    metrics_port: u16,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    begin_logging();

    let settings = match Settings::new(&args.config) {
        Ok(settings) => settings,
        Err(error) => {
            tracing::error!(%error, "could not read configuration");
            process::exit(1);
        }
    };

    let interface = args
        .interface
        .or(settings.interface)
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    let port = args.port.or(settings.port).unwrap_or(DNS_PORT);

    let ctx = match settings.build_context() {
        Ok(ctx) => ctx,
        Err(error) => {
            tracing::error!(%error, "could not load configuration");
            process::exit(1);
        }
    };
    let shared: SharedContext = Arc::new(RwLock::new(Arc::new(ctx)));

    tracing::info!(%interface, %port, "binding DNS UDP socket");
    let udp = match UdpSocket::bind((interface, port)).await {
        Ok(socket) => socket,
        Err(error) => {
            tracing::error!(?error, "could not bind DNS UDP socket");
            process::exit(1);
        }
    };

    tracing::info!(%interface, %port, "binding DNS TCP socket");
    let tcp = match TcpListener::bind((interface, port)).await {
        Ok(socket) => socket,
        Err(error) => {
            tracing::error!(?error, "could not bind DNS TCP socket");
            process::exit(1);
        }
    };

    tokio::spawn(listen_udp_task(shared.clone(), udp));
    tokio::spawn(listen_tcp_task(shared.clone(), tcp));
    tokio::spawn(reload_task(shared.clone(), args.clone()));

    tracing::info!(interface = %args.metrics_interface, port = %args.metrics_port, "binding HTTP TCP socket");
    if let Err(error) =
        serve_prometheus_endpoint_task(args.metrics_interface, args.metrics_port).await
    {
        tracing::error!(?error, "could not bind HTTP TCP socket");
        process::exit(1);
    }
}
