use anyhow::{Context, Result, bail};
use tokio::{
    io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin},
    net::{
        TcpStream,
        tcp::{OwnedReadHalf, OwnedWriteHalf},
    },
    select,
};
use tracing::{info, warn};

use crate::{cli::ClientArgs, protocol::Handshake};

type ServerLines = Lines<BufReader<OwnedReadHalf>>;

pub async fn run(args: ClientArgs) -> Result<()> {
    let (mut server, mut writer) = establish_connection(&args).await?;
    let handshake = read_handshake(&mut server).await?;
    write_stdout(&describe(&handshake)).await?;

    // `Lines::next_line` is cancel safe, so neither side loses a partial line
    // when the other branch of the select wins.
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    if run_client_loop(&mut server, &mut writer, &mut stdin).await? {
        disconnect(&mut server, &mut writer).await?;
    }

    Ok(())
}

async fn establish_connection(args: &ClientArgs) -> Result<(ServerLines, OwnedWriteHalf)> {
    let stream = TcpStream::connect(args.server)
        .await
        .with_context(|| format!("failed to connect to {}", args.server))?;

    info!("connected to {}", args.server);

    let (reader, writer) = stream.into_split();
    Ok((BufReader::new(reader).lines(), writer))
}

async fn read_handshake(server: &mut ServerLines) -> Result<Handshake> {
    match server.next_line().await? {
        Some(line) => Handshake::parse(&line),
        None => bail!("server closed the connection before greeting"),
    }
}

fn describe(handshake: &Handshake) -> String {
    format!(
        "*** connected to board {}x{}, notes {}x{}, colors: {}",
        handshake.board_width,
        handshake.board_height,
        handshake.note_width,
        handshake.note_height,
        handshake.colors.join(", ")
    )
}

/// Relays stdin to the server and server lines to stdout. Returns `true` when
/// the local side asked to stop and the server still has to be told.
async fn run_client_loop(
    server: &mut ServerLines,
    writer: &mut OwnedWriteHalf,
    stdin: &mut Lines<BufReader<Stdin>>,
) -> Result<bool> {
    loop {
        select! {
            server_line = server.next_line() => {
                match server_line? {
                    Some(line) => write_stdout(&line).await?,
                    None => {
                        write_stdout("*** server closed the connection").await?;
                        return Ok(false);
                    }
                }
            }
            input = stdin.next_line() => {
                if !handle_stdin_input(input, writer).await? {
                    return Ok(true);
                }
            }
            ctrl_c = tokio::signal::ctrl_c() => {
                if let Err(error) = ctrl_c {
                    warn!(?error, "ctrl-c handler failed");
                }
                return Ok(true);
            }
        }
    }
}

async fn handle_stdin_input(
    input: io::Result<Option<String>>,
    writer: &mut OwnedWriteHalf,
) -> Result<bool> {
    let Some(command) = input? else {
        return Ok(false);
    };

    let command = command.trim_end_matches('\r');
    if command.trim().is_empty() {
        return Ok(true);
    }

    send_line(writer, command).await?;
    Ok(true)
}

/// Says goodbye and prints whatever the server answers until it hangs up.
async fn disconnect(server: &mut ServerLines, writer: &mut OwnedWriteHalf) -> Result<()> {
    if let Err(error) = send_line(writer, "DISCONNECT").await {
        warn!(?error, "failed to send disconnect");
        return Ok(());
    }

    while let Some(line) = server.next_line().await? {
        write_stdout(&line).await?;
    }
    Ok(())
}

async fn send_line(writer: &mut OwnedWriteHalf, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await
}

async fn write_stdout(line: &str) -> io::Result<()> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await
}
