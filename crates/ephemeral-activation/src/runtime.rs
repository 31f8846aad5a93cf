//! The MPC runtime driver and peer connectivity subsystem (§4.5.3): builds
//! the per-peer TCP forwarding routes, confirms every peer's listener is
//! reachable before handing control to the MPC binary, and runs that binary
//! as a subprocess.

use ephemeral_core::{ActivationConfig, CoordError, PlayerDescriptor, PlayerId};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::Command;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

const PING: &[u8; 4] = b"ping";
const PONG: &[u8; 4] = b"pong";

/// One peer's local forwarding listener, built from its descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyRoute {
    /// This site's local port forwarding to the peer.
    pub local_port: u16,
    /// The peer's site address.
    pub peer_host: String,
    /// The peer's allocated port.
    pub peer_port: u16,
    /// The peer's logical index, for liveness-check ordering.
    pub peer_id: PlayerId,
}

/// Build one forwarding route per peer (every player but `self_id`), with
/// `local_port = base_port + peer.id`. Fails outright if fewer than two
/// players are present — a route table with no peers makes no sense.
pub fn build_routes(
    self_id: PlayerId,
    players: &[PlayerDescriptor],
    base_port: u16,
) -> Result<Vec<ProxyRoute>, CoordError> {
    if players.len() < 2 {
        return Err(CoordError::peer(format!(
            "need at least two players to build peer routes, got {}",
            players.len()
        )));
    }
    players
        .iter()
        .filter(|p| p.id != self_id)
        .map(|p| {
            let local_port = base_port
                .checked_add(u16::try_from(p.id.0).map_err(|_| {
                    CoordError::peer(format!("player id {} does not fit a port offset", p.id))
                })?)
                .ok_or_else(|| CoordError::peer("base_port + player id overflows u16"))?;
            Ok(ProxyRoute {
                local_port,
                peer_host: p.ip.clone(),
                peer_port: p.port,
                peer_id: p.id,
            })
        })
        .collect()
}

/// Start a forwarding listener for one route: local connections that send
/// the literal `"ping"` are answered with `"pong"` and closed without
/// forwarding; every other connection is proxied transparently to the peer
/// (§8: "ping-aware target"). Runs until `shutdown` fires.
pub async fn start_proxy_listener(
    route: ProxyRoute,
    shutdown: CancellationToken,
) -> Result<(), CoordError> {
    let listener = TcpListener::bind(("0.0.0.0", route.local_port))
        .await
        .map_err(|err| CoordError::peer(format!("proxy bind on {}: {err}", route.local_port)))?;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            accepted = listener.accept() => {
                let (socket, peer_addr) = accepted
                    .map_err(|err| CoordError::peer(format!("proxy accept failed: {err}")))?;
                let route = route.clone();
                tracing::debug!(%peer_addr, local_port = route.local_port, "proxy connection accepted");
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(socket, &route).await {
                        tracing::warn!(%err, local_port = route.local_port, "proxy connection failed");
                    }
                });
            }
        }
    }
}

async fn serve_connection(mut socket: TcpStream, route: &ProxyRoute) -> Result<(), CoordError> {
    let mut prefix = [0u8; 4];
    socket
        .read_exact(&mut prefix)
        .await
        .map_err(|err| CoordError::peer(format!("proxy read prefix: {err}")))?;

    if &prefix == PING {
        socket
            .write_all(PONG)
            .await
            .map_err(|err| CoordError::peer(format!("proxy pong write: {err}")))?;
        return Ok(());
    }

    let mut upstream = TcpStream::connect((route.peer_host.as_str(), route.peer_port))
        .await
        .map_err(|err| CoordError::peer(format!("proxy upstream connect: {err}")))?;
    upstream
        .write_all(&prefix)
        .await
        .map_err(|err| CoordError::peer(format!("proxy prefix forward: {err}")))?;

    tokio::io::copy_bidirectional(&mut socket, &mut upstream)
        .await
        .map_err(|err| CoordError::peer(format!("proxy passthrough: {err}")))?;
    Ok(())
}

/// Confirm every peer with a higher index than `self_id` is reachable
/// before the MPC binary starts: dial, then attempt to read one byte within
/// `dial_timeout`. A read timeout means the peer's listener is up and
/// waiting (it will not speak until the MPC binary reaches that socket); a
/// connection refused or EOF means the peer isn't ready yet, and the dial
/// is retried every `retry_sleep` until `retry_timeout` elapses.
pub async fn peer_liveness_check(
    self_id: PlayerId,
    players: &[PlayerDescriptor],
    dial_timeout: Duration,
    retry_timeout: Duration,
    retry_sleep: Duration,
) -> Result<(), CoordError> {
    for peer in players.iter().filter(|p| p.id > self_id) {
        check_one_peer(peer, dial_timeout, retry_timeout, retry_sleep).await?;
    }
    Ok(())
}

async fn check_one_peer(
    peer: &PlayerDescriptor,
    dial_timeout: Duration,
    retry_timeout: Duration,
    retry_sleep: Duration,
) -> Result<(), CoordError> {
    let deadline = tokio::time::Instant::now() + retry_timeout;
    loop {
        match try_peer_once(peer, dial_timeout).await {
            Ok(()) => return Ok(()),
            Err(err) if tokio::time::Instant::now() < deadline => {
                tracing::debug!(peer = %peer.id, %err, "peer not ready yet, retrying");
                tokio::time::sleep(retry_sleep).await;
            }
            Err(err) => {
                return Err(CoordError::peer(format!(
                    "peer {} never became reachable: {err}",
                    peer.id
                )))
            }
        }
    }
}

async fn try_peer_once(peer: &PlayerDescriptor, dial_timeout: Duration) -> Result<(), CoordError> {
    let mut stream = TcpStream::connect((peer.ip.as_str(), peer.port))
        .await
        .map_err(|err| CoordError::peer(err.to_string()))?;
    let mut byte = [0u8; 1];
    match timeout(dial_timeout, stream.read(&mut byte)).await {
        Ok(Ok(0)) => Err(CoordError::peer("peer closed connection (EOF)")),
        Ok(Ok(_)) => Ok(()),
        Ok(Err(err)) => Err(CoordError::peer(err.to_string())),
        Err(_elapsed) => Ok(()),
    }
}

/// Confirm every local forwarding listener in `routes` is bound and
/// answering pings before the MPC binary is started (§8: "ping-aware
/// target" is exercised against our own listeners, not just a peer's).
pub async fn probe_own_listeners(routes: &[ProxyRoute], probe_timeout: Duration) -> Result<(), CoordError> {
    for route in routes {
        let mut stream = timeout(
            probe_timeout,
            TcpStream::connect(("127.0.0.1", route.local_port)),
        )
        .await
        .map_err(|_| CoordError::peer(format!("proxy listener on {} not yet bound", route.local_port)))?
        .map_err(|err| CoordError::peer(format!("proxy listener self-probe connect: {err}")))?;

        stream
            .write_all(PING)
            .await
            .map_err(|err| CoordError::peer(format!("proxy listener self-probe write: {err}")))?;
        let mut reply = [0u8; 4];
        timeout(probe_timeout, stream.read_exact(&mut reply))
            .await
            .map_err(|_| CoordError::peer(format!("proxy listener on {} did not reply to ping", route.local_port)))?
            .map_err(|err| CoordError::peer(format!("proxy listener self-probe read: {err}")))?;
        if &reply != PONG {
            return Err(CoordError::peer(format!(
                "proxy listener on {} answered ping with garbage",
                route.local_port
            )));
        }
    }
    Ok(())
}

/// Run the MPC runtime binary as a subprocess for this activation, passing
/// this player's index, the program name and the total player count.
/// Returns an error (mapped to `PlayingError` by the caller) on a non-zero
/// exit.
pub async fn run_mpc_runtime(
    config: &ActivationConfig,
    self_id: PlayerId,
    player_count: u32,
    program_path: &std::path::Path,
) -> Result<(), CoordError> {
    let status = Command::new(&config.mpc_runtime_path)
        .arg("--player")
        .arg(self_id.0.to_string())
        .arg("--players")
        .arg(player_count.to_string())
        .arg("--program")
        .arg(program_path)
        .status()
        .await
        .map_err(|err| CoordError::runtime(format!("spawning MPC runtime: {err}")))?;

    if status.success() {
        Ok(())
    } else {
        Err(CoordError::runtime(format!(
            "MPC runtime exited with status {status}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ephemeral_core::Pod;

    fn descriptor(id: u32, port: u16) -> PlayerDescriptor {
        PlayerDescriptor {
            id: PlayerId(id),
            count: 2,
            ip: "127.0.0.1".to_string(),
            port,
            pod: Pod::from(format!("pod{id}")),
        }
    }

    #[test]
    fn build_routes_rejects_fewer_than_two_players() {
        let err = build_routes(PlayerId(0), &[descriptor(0, 30000)], 40000).unwrap_err();
        assert_eq!(err.category(), "peer");
    }

    #[test]
    fn build_routes_excludes_self_and_offsets_from_base_port() {
        let players = vec![descriptor(0, 30000), descriptor(1, 30001)];
        let routes = build_routes(PlayerId(0), &players, 40000).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].peer_id, PlayerId(1));
        assert_eq!(routes[0].local_port, 40001);
    }

    #[tokio::test]
    async fn ping_aware_listener_responds_without_forwarding() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let local_port = listener.local_addr().unwrap().port();
        let route = ProxyRoute {
            local_port,
            peer_host: "127.0.0.1".to_string(),
            peer_port: 1,
            peer_id: PlayerId(1),
        };
        let shutdown = CancellationToken::new();
        let task_shutdown = shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_shutdown.cancelled() => break,
                    accepted = listener.accept() => {
                        let (socket, _) = accepted.unwrap();
                        let route = route.clone();
                        tokio::spawn(async move { serve_connection(socket, &route).await });
                    }
                }
            }
        });

        let mut client = TcpStream::connect(("127.0.0.1", local_port)).await.unwrap();
        client.write_all(PING).await.unwrap();
        let mut reply = [0u8; 4];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply, PONG);
        shutdown.cancel();
    }
}
