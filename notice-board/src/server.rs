use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
};
use tracing::{info, warn};

use crate::{board::Board, session};

/// Accept loop for the board. Each connection gets its own task that shares
/// the one [`Board`].
pub struct Server {
    listener: TcpListener,
    board: Arc<Board>,
}

impl Server {
    pub fn new(listener: TcpListener, board: Arc<Board>) -> Self {
        Self { listener, board }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until `shutdown` resolves. Sessions already running
    /// are left to finish on their own.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Server { listener, board } = self;
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => {
                    info!("board server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    handle_accept_result(accept_result, &board);
                }
            }
        }

        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }
}

fn handle_accept_result(result: std::io::Result<(TcpStream, SocketAddr)>, board: &Arc<Board>) {
    match result {
        Ok((stream, peer)) => spawn_session(stream, peer, board),
        Err(err) => warn!(error = ?err, "failed to accept connection"),
    }
}

fn spawn_session(stream: TcpStream, peer: SocketAddr, board: &Arc<Board>) {
    let board = Arc::clone(board);
    tokio::spawn(async move {
        if let Err(err) = session::handle_connection(stream, board).await {
            warn!(peer = %peer, error = ?err, "client connection closed with error");
        }
    });
}
