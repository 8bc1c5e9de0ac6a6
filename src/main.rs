/*!
# aeternity Command Line Interface

## Help

```bash
aecli help [subcommand]
```

## Example Usage

```bash
aecli decode tx_...
aecli contract-id --owner ak_... --nonce 3
aecli --config channel channel
```

## Dev

To run from source:

```bash
cargo run -- --help
RUST_LOG=debug cargo run -- channel
```
*/

use std::sync::Arc;

use async_trait::async_trait;
use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use tokio::sync::broadcast::error::RecvError;
use tracing::{event, Level};

use aeternity_rust::builder::{
    build_contract_id, build_tx_hash, get_min_fee, unpack_tx, BuildOptions,
};
use aeternity_rust::channel::{
    Channel, ChannelEvent, ChannelStatus, SignContext, SignResult, SignTag, Signer,
};
use aeternity_rust::node::{HttpNode, NodeApi};
use aeternity_rust::settings::Settings;
use aeternity_rust::{Error, Result};

/// Logs every signature request of the node and declines it. The client
/// holds no keys.
struct DecliningSigner;

#[async_trait]
impl Signer for DecliningSigner {
    async fn sign(&self, tag: SignTag, tx: &str, context: &SignContext) -> SignResult {
        event!(
            Level::WARN,
            "declining {} signature of {} ({} updates)",
            tag,
            tx,
            context.updates.len()
        );
        SignResult::RejectedGeneric
    }
}

fn argument<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .value_of(name)
        .ok_or_else(|| Error::argument(name, "provided", "nothing"))
}

async fn run_channel(settings: Settings) -> Result<()> {
    let options = settings
        .channel
        .ok_or_else(|| Error::Config(String::from("missing [channel] settings")))?;
    let channel = Channel::initialize(options, Arc::new(DecliningSigner)).await?;
    let mut events = channel.subscribe();
    loop {
        match events.recv().await {
            Ok(ChannelEvent::StatusChanged(status)) => {
                println!("status: {}", status);
                if status == ChannelStatus::Disconnected {
                    return Ok(());
                }
            }
            Ok(ChannelEvent::Error(err)) => println!("error: {}", err),
            Ok(channel_event) => println!("{:?}", channel_event),
            Err(RecvError::Lagged(skipped)) => {
                event!(Level::WARN, "skipped {} channel events", skipped)
            }
            Err(RecvError::Closed) => return Ok(()),
        }
    }
}

#[tokio::main]
pub async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let matches = App::new("aeternity Command Line Interface")
        .about("Decode and inspect aeternity transactions, follow state channels")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .help("config file name"),
        )
        .subcommand(
            SubCommand::with_name("decode")
                .about("prints the fields of an encoded transaction")
                .arg(Arg::with_name("tx").required(true).help("tx_ string")),
        )
        .subcommand(
            SubCommand::with_name("hash")
                .about("prints the hash of an encoded transaction")
                .arg(Arg::with_name("tx").required(true).help("tx_ string")),
        )
        .subcommand(
            SubCommand::with_name("min-fee")
                .about("prints the minimum fee of an encoded transaction")
                .arg(Arg::with_name("tx").required(true).help("tx_ string")),
        )
        .subcommand(
            SubCommand::with_name("contract-id")
                .about("prints the address of a contract created by an account")
                .arg(
                    Arg::with_name("owner")
                        .short("o")
                        .long("owner")
                        .takes_value(true)
                        .required(true)
                        .help("ak_ address of the owner"),
                )
                .arg(
                    Arg::with_name("nonce")
                        .short("n")
                        .long("nonce")
                        .takes_value(true)
                        .required(true)
                        .help("nonce of the create transaction"),
                ),
        )
        .subcommand(
            SubCommand::with_name("nonce")
                .about("asks the node for the next nonce of an account")
                .arg(Arg::with_name("account").required(true).help("ak_ address")),
        )
        .subcommand(
            SubCommand::with_name("channel")
                .about("opens the channel configured in [channel] and prints its events"),
        )
        .get_matches();

    let config_name = matches.value_of("config").unwrap_or("config");
    let settings = Settings::load(config_name)?;

    match matches.subcommand() {
        ("decode", Some(matches)) => {
            let params = unpack_tx(argument(matches, "tx")?, None)?;
            println!("{:#}", params.to_json());
        }
        ("hash", Some(matches)) => {
            println!("{}", build_tx_hash(argument(matches, "tx")?)?);
        }
        ("min-fee", Some(matches)) => {
            let params = unpack_tx(argument(matches, "tx")?, None)?;
            println!("{}", get_min_fee(&params, &BuildOptions::default())?);
        }
        ("contract-id", Some(matches)) => {
            let nonce = argument(matches, "nonce")?;
            let nonce = nonce
                .parse::<u128>()
                .map_err(|_| Error::argument("nonce", "an unsigned integer", nonce))?;
            println!("{}", build_contract_id(argument(matches, "owner")?, nonce)?);
        }
        ("nonce", Some(matches)) => {
            let node = HttpNode::new(&settings.node.url)?;
            println!("{}", node.next_nonce(argument(matches, "account")?).await?);
        }
        ("channel", Some(_)) => run_channel(settings).await?,
        _ => {}
    }
    Ok(())
}
