use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use clap::{Args, Parser, Subcommand};

use crate::config::{BoardConfig, ConfigError};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Host the shared notice board over TCP.
    Serve(ServeArgs),
    /// Connect to a board server and type commands interactively.
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Interface address to bind.
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// TCP port to listen on. Use 0 for an ephemeral port.
    pub port: u16,

    /// Board width in cells.
    pub board_width: u32,

    /// Board height in cells.
    pub board_height: u32,

    /// Width of every note.
    pub note_width: u32,

    /// Height of every note.
    pub note_height: u32,

    /// Colors notes may use, in the order advertised to clients.
    #[arg(required = true, num_args = 1..)]
    pub colors: Vec<String>,
}

impl ServeArgs {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    pub fn board_config(&self) -> Result<BoardConfig, ConfigError> {
        BoardConfig::new(
            self.board_width,
            self.board_height,
            self.note_width,
            self.note_height,
            self.colors.clone(),
        )
    }
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Address of the board server to connect to.
    #[arg(long, default_value = "127.0.0.1:4554")]
    pub server: SocketAddr,
}
