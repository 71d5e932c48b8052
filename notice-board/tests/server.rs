use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use notice_board::{board::Board, config::BoardConfig, server::Server};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    net::{
        TcpListener, TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    sync::oneshot,
    task::JoinHandle,
    time::timeout,
};

const READ_TIMEOUT: Duration = Duration::from_secs(2);

struct TestServer {
    addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl TestServer {
    async fn start(config: BoardConfig) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let server = Server::new(listener, Arc::new(Board::new(Arc::new(config))));

        let (shutdown, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            let _ = server.run_until(shutdown).await;
        });

        Ok(Self {
            addr,
            shutdown,
            task,
        })
    }

    async fn stop(self) {
        let _ = self.shutdown.send(());
        let _ = self.task.await;
    }
}

fn small_board() -> BoardConfig {
    BoardConfig::new(10, 10, 2, 2, vec!["red".into(), "blue".into()]).expect("valid config")
}

struct Peer {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Peer {
    /// Connects and returns the peer with the greeting line it received.
    async fn connect(addr: SocketAddr) -> Result<(Self, String)> {
        let stream = TcpStream::connect(addr).await?;
        let (reader, writer) = stream.into_split();
        let mut peer = Self {
            reader: BufReader::new(reader),
            writer,
        };
        let greeting = peer
            .read_line()
            .await?
            .context("server closed before greeting")?;
        Ok((peer, greeting))
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let bytes = timeout(READ_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .context("timed out waiting for server line")??;
        if bytes == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Sends a single-line command and returns the single-line reply.
    async fn command(&mut self, line: &str) -> Result<String> {
        self.send(line).await?;
        self.read_line()
            .await?
            .with_context(|| format!("no reply to '{line}'"))
    }

    /// Sends a query and returns the result lines between the header and `END`.
    async fn query(&mut self, line: &str) -> Result<Vec<String>> {
        let header = self.command(line).await?;
        let parts: Vec<&str> = header.split_whitespace().collect();
        let count: usize = match parts.as_slice() {
            ["OK", count, "RESULTS"] => count.parse()?,
            _ => bail!("unexpected query header '{header}'"),
        };

        let mut results = Vec::with_capacity(count);
        for _ in 0..count {
            results.push(self.read_line().await?.context("listing cut short")?);
        }
        let end = self.read_line().await?;
        if end.as_deref() != Some("END") {
            bail!("expected END after {count} results, got {end:?}");
        }
        Ok(results)
    }
}

#[tokio::test]
async fn greeting_precedes_any_command() -> Result<()> {
    let server = TestServer::start(small_board()).await?;

    let (_peer, greeting) = Peer::connect(server.addr).await?;
    assert_eq!(greeting, "HELLO NBB/1.0 10 10 2 2 red blue");

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn walkthrough_over_tcp() -> Result<()> {
    let server = TestServer::start(small_board()).await?;
    let (mut peer, _) = Peer::connect(server.addr).await?;

    assert_eq!(peer.command("POST 0 0 red hello").await?, "OK POSTED");
    assert!(
        peer.command("POST 0 0 blue bye")
            .await?
            .starts_with("ERROR [05] [COMPLETE_OVERLAP] [")
    );
    assert_eq!(peer.command("POST 8 8 red corner").await?, "OK POSTED");
    assert!(
        peer.command("POST 9 9 red over")
            .await?
            .starts_with("ERROR [02] [OUT_OF_BOUNDS] [")
    );
    assert_eq!(peer.command("PIN 1 1").await?, "OK PINNED");
    assert_eq!(peer.query("GET pins").await?, ["PIN 1 1"]);
    assert_eq!(peer.command("UNPIN 1 1").await?, "OK UNPINNED");
    assert!(
        peer.command("PIN 5 5")
            .await?
            .starts_with("ERROR [06] [NO_NOTE_AT_COORDINATE] [")
    );
    assert_eq!(peer.command("SHAKE").await?, "OK SHAKEN 2");
    assert!(peer.query("GET").await?.is_empty());

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn sessions_share_one_board() -> Result<()> {
    let server = TestServer::start(small_board()).await?;
    let (mut alice, _) = Peer::connect(server.addr).await?;
    let (mut bob, _) = Peer::connect(server.addr).await?;

    assert_eq!(alice.command("POST 0 0 red from   alice").await?, "OK POSTED");
    assert_eq!(bob.command("POST 4 4 blue from bob").await?, "OK POSTED");
    assert_eq!(
        bob.query("GET").await?,
        ["NOTE 0 0 red from   alice", "NOTE 4 4 blue from bob"]
    );

    assert_eq!(bob.command("PIN 0 0").await?, "OK PINNED");
    assert_eq!(alice.command("SHAKE").await?, "OK SHAKEN 1");
    assert_eq!(alice.query("GET color=red").await?, ["NOTE 0 0 red from   alice"]);
    assert_eq!(alice.query("GET contains=4,4").await?, Vec::<String>::new());

    assert_eq!(bob.command("CLEAR").await?, "OK CLEARED");
    assert!(alice.query("GET").await?.is_empty());
    assert!(alice.query("GET pins").await?.is_empty());

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn concurrent_posts_from_many_sessions_all_land() -> Result<()> {
    const SESSIONS: u32 = 16;
    let config = BoardConfig::new(40, 40, 2, 2, vec!["red".into()]).expect("valid config");
    let server = TestServer::start(config).await?;
    let addr = server.addr;

    let posts = (0..SESSIONS).map(|i| async move {
        let (mut peer, _) = Peer::connect(addr).await?;
        let reply = peer.command(&format!("POST {} {} red note {i}", i * 2, i)).await?;
        peer.command("DISCONNECT").await?;
        anyhow::Ok(reply)
    });
    let replies = futures::future::try_join_all(posts).await?;
    assert!(replies.iter().all(|reply| reply == "OK POSTED"), "{replies:?}");

    let (mut observer, _) = Peer::connect(addr).await?;
    assert_eq!(observer.query("GET").await?.len(), SESSIONS as usize);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn disconnect_is_acknowledged_then_closed() -> Result<()> {
    let server = TestServer::start(small_board()).await?;
    let (mut peer, _) = Peer::connect(server.addr).await?;

    assert_eq!(peer.command("disconnect").await?, "OK DISCONNECTING");
    assert_eq!(peer.read_line().await?, None);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn protocol_errors_keep_the_session_open() -> Result<()> {
    let server = TestServer::start(small_board()).await?;
    let (mut peer, _) = Peer::connect(server.addr).await?;

    assert!(peer.command("").await?.starts_with("ERROR [01] [INVALID_FORMAT]"));
    assert!(peer.command("POST x 0 red hi").await?.starts_with("ERROR [03]"));
    assert!(peer.command("POST 0 0 green hi").await?.starts_with("ERROR [04]"));
    assert!(peer.command("UNPIN 0 0").await?.starts_with("ERROR [07] [PIN_NOT_FOUND]"));
    assert_eq!(peer.command("POST 0 0 red still here").await?, "OK POSTED");

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn crlf_terminated_lines_are_accepted() -> Result<()> {
    let server = TestServer::start(small_board()).await?;
    let (mut peer, _) = Peer::connect(server.addr).await?;

    peer.writer.write_all(b"POST 2 2 red windows line\r\n").await?;
    assert_eq!(peer.read_line().await?.as_deref(), Some("OK POSTED"));
    assert_eq!(peer.query("GET").await?, ["NOTE 2 2 red windows line"]);

    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn broken_session_does_not_affect_others() -> Result<()> {
    let server = TestServer::start(small_board()).await?;
    let (mut steady, _) = Peer::connect(server.addr).await?;

    {
        let (mut flaky, _) = Peer::connect(server.addr).await?;
        // Half a command, then the socket goes away.
        flaky.writer.write_all(b"POST 0 0 red never fini").await?;
        flaky.writer.flush().await?;
    }
    {
        let (mut garbled, _) = Peer::connect(server.addr).await?;
        garbled.writer.write_all(&[0xff, 0xfe, b'\n']).await?;
        assert_eq!(garbled.read_line().await?, None);
    }

    assert_eq!(steady.command("POST 4 4 blue steady").await?, "OK POSTED");
    let (mut latecomer, greeting) = Peer::connect(server.addr).await?;
    assert!(greeting.starts_with("HELLO NBB/1.0"));
    let notes = latecomer.query("GET color=blue").await?;
    assert_eq!(notes, ["NOTE 4 4 blue steady"]);

    server.stop().await;
    Ok(())
}
