use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    net::TcpStream,
};
use tracing::{debug, info};

use crate::{board::Board, protocol};

/// Why a session stopped without a transport error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// The client sent `DISCONNECT` and received the acknowledgement.
    Disconnected,
    /// The client closed its side of the stream.
    EndOfStream,
}

/// Drives one accepted connection to completion. The stream is owned here and
/// closed when this returns, whichever way it returns.
pub async fn handle_connection(stream: TcpStream, board: Arc<Board>) -> Result<SessionEnd> {
    let peer = stream.peer_addr().ok();
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    info!(?peer, "client connected");
    let end = run_session(&mut reader, &mut writer, &board, peer).await?;
    info!(?peer, ?end, "client disconnected");

    Ok(end)
}

/// Sends the handshake, then answers one reply per received line until the
/// client disconnects or the stream ends.
pub async fn run_session<R, W>(
    reader: &mut R,
    writer: &mut W,
    board: &Board,
    peer: Option<SocketAddr>,
) -> Result<SessionEnd>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let config = Arc::clone(board.config());
    write_text(writer, &protocol::handshake(&config)).await?;

    let mut line = String::new();
    loop {
        line.clear();
        let bytes = reader.read_line(&mut line).await?;
        if bytes == 0 {
            return Ok(SessionEnd::EndOfStream);
        }

        let command = strip_terminator(&line);
        let response = protocol::handle_line(command, board, &config).await;
        debug!(?peer, command, reply = response.text().trim_end(), "handled command");

        write_text(writer, response.text()).await?;
        if response.close_after_write() {
            return Ok(SessionEnd::Disconnected);
        }
    }
}

fn strip_terminator(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

async fn write_text<W>(writer: &mut W, text: &str) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(text.as_bytes()).await?;
    writer.flush().await
}
