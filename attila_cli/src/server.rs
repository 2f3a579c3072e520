use std::net::TcpListener;
use std::os::unix::net::UnixListener;
use std::sync::Arc;
use std::time::Instant;

use actix_web::http::header;
use actix_web::{dev, web, App, HttpServer};
use log::Level;
use tokio::signal::unix::{signal, SignalKind};
use url::Url;

use attila_state::{RegionState, State};

use crate::config::Config;
use crate::http::{self, AppState};
use crate::nomad::{api, Controller};
use crate::{ErrorKind, Result, ResultExt};

const SHUTDOWN_TIMEOUT_SECS: u64 = 5;
const CLIENT_TIMEOUT_MS: u64 = 5_000;
const KEEP_ALIVE_SECS: usize = 15;

enum Bind {
    Tcp(TcpListener),
    Unix(UnixListener),
}

/// The attila server: a state backend, the controller facade and one HTTP
/// server spanning every configured listener.
pub struct Server {
    state: Arc<dyn State>,
    controller: Arc<Controller>,
    binds: Vec<(String, Bind)>,
    access_log_level: Level,
    handle: Option<dev::Server>,
}

impl Server {
    /// Construct the server: build the state backend, restore the region
    /// clients from it, and open every configured listener. Serving does not
    /// begin until `start`.
    pub fn new(cfg: &Config) -> Result<Server> {
        let state = attila_state::from_config(&cfg.state())?;
        info!("successfully setup state backend name={}", state.name());

        let controller = Arc::new(Controller::new());
        restore(state.as_ref(), &controller)?;

        let http_cfg = cfg.http();
        let access_log_level = http_cfg.access_log_level()?;

        let mut binds = vec![];
        for bind in http_cfg.bind_list() {
            let parsed = Url::parse(&bind.addr)
                .chain_err(|| format!("failed to parse bind address '{}'", bind.addr))?;

            let listener = match parsed.scheme() {
                // TLS termination is left to the operator's frontend; the
                // https scheme binds a plain TCP listener like http.
                "http" | "https" => {
                    let host = parsed
                        .host_str()
                        .ok_or_else(|| format!("bind address '{}' has no host", bind.addr))?;
                    let port = parsed.port_or_known_default().unwrap_or(80);
                    let tcp = TcpListener::bind((host, port))
                        .chain_err(|| format!("failed to setup HTTP listener on '{}'", bind.addr))?;
                    Bind::Tcp(tcp)
                }
                "unix" => {
                    let unix = UnixListener::bind(parsed.path()).chain_err(|| {
                        format!("failed to setup unix listener on '{}'", parsed.path())
                    })?;
                    Bind::Unix(unix)
                }
                scheme => bail!(ErrorKind::UnsupportedBindScheme(scheme.to_string())),
            };

            info!("successfully setup HTTP server address={}", bind.addr);
            binds.push((bind.addr.clone(), listener));
        }

        Ok(Server {
            state,
            controller,
            binds,
            access_log_level,
            handle: None,
        })
    }

    /// Begin serving on every listener. Returns once the workers are
    /// spawned; the caller should then wait on signals.
    pub fn start(&mut self) -> Result<()> {
        let data = web::Data::new(AppState {
            state: self.state.clone(),
            controller: self.controller.clone(),
        });
        let access_log_level = self.access_log_level;

        let mut server = HttpServer::new(move || {
            App::new()
                .app_data(data.clone())
                .app_data(http::json_error_config())
                .wrap_fn(move |req, srv| {
                    use actix_web::dev::Service;

                    let started = Instant::now();
                    let remote_address = req
                        .connection_info()
                        .realip_remote_addr()
                        .unwrap_or("-")
                        .to_string();
                    let path = req.path().to_string();
                    let method = req.method().to_string();
                    let proto = format!("{:?}", req.version());
                    let user_agent = req
                        .headers()
                        .get(header::USER_AGENT)
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    let content_in = content_length(req.headers());

                    let fut = srv.call(req);
                    async move {
                        let res = fut.await?;
                        log!(
                            access_log_level,
                            "handled HTTP request remote_address={} path={} proto={} method={} \
                             user_agent={:?} status={} latency_ns={} content_in_bytes={} \
                             content_out_bytes={}",
                            remote_address,
                            path,
                            proto,
                            method,
                            user_agent,
                            res.status().as_u16(),
                            started.elapsed().as_nanos(),
                            content_in,
                            content_length(res.headers()),
                        );
                        Ok(res)
                    }
                })
                .configure(http::configure)
        })
        .disable_signals()
        .client_timeout(CLIENT_TIMEOUT_MS)
        .keep_alive(KEEP_ALIVE_SECS)
        .shutdown_timeout(SHUTDOWN_TIMEOUT_SECS);

        for (addr, bind) in self.binds.drain(..) {
            server = match bind {
                Bind::Tcp(listener) => server
                    .listen(listener)
                    .chain_err(|| format!("failed to serve on '{}'", addr))?,
                Bind::Unix(listener) => server
                    .listen_uds(listener)
                    .chain_err(|| format!("failed to serve on '{}'", addr))?,
            };
            info!("server now listening for connections address={}", addr);
        }

        self.handle = Some(server.run());
        Ok(())
    }

    /// Gracefully stop serving, bounded by the shutdown timeout.
    pub async fn stop(&self) {
        if let Some(handle) = &self.handle {
            handle.stop(true).await;
            info!("successfully shutdown HTTP server");
        }
    }

    /// Block until a handled signal arrives. SIGHUP is reserved for a
    /// future reload and is ignored; anything else triggers a graceful
    /// stop and returns.
    pub async fn wait_for_signals(&self) -> Result<()> {
        let mut hangup = signal(SignalKind::hangup())?;
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;

        loop {
            debug!("wait for signal handler started");

            tokio::select! {
                _ = hangup.recv() => {
                    info!("received signal signal=SIGHUP");
                    continue;
                }
                _ = interrupt.recv() => info!("received signal signal=SIGINT"),
                _ = terminate.recv() => info!("received signal signal=SIGTERM"),
            }

            self.stop().await;
            return Ok(());
        }
    }

    pub fn region_num(&self) -> usize {
        self.controller.region_num()
    }
}

fn content_length(headers: &actix_web::http::HeaderMap) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Rebuild the in-process region client cache from the persisted regions.
///
/// A region whose client cannot be built is logged and skipped so a broken
/// region spec never prevents the server from starting; the operator fixes
/// the region while everything else keeps working.
pub fn restore(state: &dyn State, controller: &Controller) -> Result<()> {
    let regions = state.regions().list()?;

    for region in regions {
        match api::Client::new(&region) {
            Ok(client) => {
                controller.region_set(&region.name, client);
                debug!("restored region client region_name={}", region.name);
            }
            Err(e) => warn!(
                "failed to restore region client region_name={} error={}",
                region.name,
                crate::error_chain_text(&e)
            ),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use attila_definitions::{Region, RegionApi};
    use attila_state::{FileState, MemState, RegionState};
    use tempfile::tempdir;

    fn region(name: &str, address: &str) -> Region {
        Region {
            name: name.into(),
            group: "eu".into(),
            auth: None,
            api: vec![RegionApi {
                address: address.into(),
                default: true,
            }],
            tls: None,
            metadata: None,
        }
    }

    #[actix_rt::test]
    async fn restore_rebuilds_clients_from_file_state() {
        let dir = tempdir().unwrap();

        // First server life: persist one region, then drop everything.
        {
            let state = FileState::new(dir.path()).unwrap();
            state
                .regions()
                .create(region("euw1", "http://10.0.0.10:4646"))
                .unwrap();
        }

        // Second life: restore rebuilds the client cache from disk alone.
        let state = FileState::new(dir.path()).unwrap();
        let controller = Controller::new();
        restore(&state, &controller).unwrap();

        assert_eq!(controller.region_num(), 1);
    }

    #[actix_rt::test]
    async fn restore_skips_unbuildable_region() {
        let state = MemState::new();
        state
            .regions()
            .create(region("bad", "not a url at all"))
            .unwrap();
        state
            .regions()
            .create(region("euw1", "http://10.0.0.10:4646"))
            .unwrap();

        let controller = Controller::new();
        restore(&state, &controller).unwrap();

        // the broken region is skipped, the good one restored
        assert_eq!(controller.region_num(), 1);
    }
}
