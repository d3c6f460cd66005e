use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use xfer_core::config::Config;
use xfer_core::contract::{
    build_propose_payment, build_reveal_key, parse_log, verify_propose_commitment, Reservation, Utxo,
};
use xfer_core::model::{TransferId, TransferParams};
use xfer_core::pipeline::{decrypt_and_verify, receive_stream, verify_clear_root, Sender as ChunkSender};
use xfer_core::state_machine::{Action, BuyerEvent, BuyerMachine};
use xfer_core::store::FileChunkStore;
use xfer_ledger::{CursorStore, LedgerClient, MemoryLedger, Observer, ObserverEvent, SledCursorStore};
use xfer_transport::client::{read_all_records, request_content, submit_proposal};
use xfer_transport::server::SellerCatalog;
use xfer_wallet::{generate_keypair, write_key_file};
use xfer_wallet::funds::{FundsSource, InMemoryFundsSource};

#[derive(Parser)]
#[command(name = "xfer")]
#[command(about = "fair-exchange content delivery CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generates a fresh ed25519 keypair and writes it to a 64-byte key file.
    KeyGen { path: PathBuf },
    /// Serves a single file's chunk stream over HTTP, per §6.
    Serve {
        file: PathBuf,
        #[arg(long, default_value = "0000000000000000000000000000000000000000000000000000000000000001")]
        key_hex: String,
        #[arg(long, default_value = "127.0.0.1:8080")]
        listen: String,
    },
    /// Runs the full buyer/seller happy path in one process (§8 scenario 1),
    /// without any network I/O — useful for exercising C1-C4 end to end.
    Demo { file: PathBuf },
    /// Runs a buyer over a real HTTP round trip against an in-process
    /// seller, driven end to end by `BuyerMachine` and the ledger
    /// observer (§8 scenarios 1, 2, 4, 5).
    Buy {
        file: PathBuf,
        #[arg(long, value_enum, default_value = "happy")]
        scenario: Scenario,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Scenario {
    /// Honest seller, honest buyer: proposal accepted, key revealed, file recovered.
    Happy,
    /// Buyer receives the stream but never proposes payment.
    Silent,
    /// The catalog advertises a root that doesn't match what it actually streams.
    WrongRoot,
    /// The seller accepts the proposal but never reveals the key in time.
    LateReveal,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    match cli.command {
        Commands::KeyGen { path } => {
            let keypair = generate_keypair();
            write_key_file(&path, &keypair).context("writing key file")?;
            println!("wrote key file to {}", path.display());
        }
        Commands::Serve { file, key_hex, listen } => serve(file, key_hex, listen).await?,
        Commands::Demo { file } => demo(file)?,
        Commands::Buy { file, scenario } => buy(file, scenario).await?,
    }
    Ok(())
}

struct SingleFileCatalog {
    root: xfer_core::model::Hash,
    plaintext: Vec<u8>,
    key: xfer_core::model::Key,
}

impl SellerCatalog for SingleFileCatalog {
    fn lookup(&self, clear_root: xfer_core::model::Hash) -> Option<(Vec<u8>, xfer_core::model::Key)> {
        if clear_root == self.root {
            Some((self.plaintext.clone(), self.key))
        } else {
            None
        }
    }
}

async fn serve(file: PathBuf, key_hex: String, listen: String) -> Result<()> {
    let plaintext = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
    let key_bytes = hex::decode(&key_hex).context("key must be hex")?;
    let key: xfer_core::model::Key = key_bytes.try_into().ok().context("key must be 32 bytes")?;
    let config = Config::default();

    let mut sender = ChunkSender::new(&plaintext, config.chunk_size, key);
    while sender.next_chunk()?.is_some() {}
    let (root, _cipher_root) = sender.finalize()?;

    let catalog = Arc::new(SingleFileCatalog { root, plaintext, key });
    println!("serving clearroot {} on {}", hex::encode(root), listen);
    let app = xfer_transport::router(catalog, config.chunk_size);
    let listener = tokio::net::TcpListener::bind(&listen).await.context("binding listener")?;
    axum::serve(listener, app).await.context("serving")?;
    Ok(())
}

/// Runs scenario 1 of §8 (happy path) without a network hop: builds the
/// chunk stream in memory, receives it into a temp store, checks roots,
/// assembles a propose-payment program from an ad hoc reservation, and
/// verifies the seller would accept it.
fn demo(file: PathBuf) -> Result<()> {
    let plaintext = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
    let key = [7u8; 32];
    let config = Config::default();

    let mut sender = ChunkSender::new(&plaintext, config.chunk_size, key);
    let mut records = Vec::new();
    while let Some(rec) = sender.next_chunk()? {
        records.push(rec);
    }
    let (seller_clear_root, seller_cipher_root) = sender.finalize()?;

    let tmp = tempfile::NamedTempFile::new().context("creating temp chunk store")?;
    let mut store = FileChunkStore::create(tmp.path())?;
    let (buyer_clear_root, buyer_cipher_root) = receive_stream(&mut store, records.into_iter().map(Ok))?;
    verify_clear_root(buyer_clear_root, seller_clear_root)?;
    if buyer_cipher_root != seller_cipher_root {
        bail!("cipher root mismatch between seller and buyer views");
    }

    let reservation = Reservation {
        inputs: vec![Utxo { anchor: [1u8; 32], amount: 137, asset_id: [0u8; 32], owner: [2u8; 32] }],
        change: 37,
    };
    let params = TransferParams {
        clear_root: buyer_clear_root,
        cipher_root: buyer_cipher_root,
        amount: 100,
        asset_id: [0u8; 32],
        reveal_deadline: 10_000,
        refund_deadline: 20_000,
        buyer: [2u8; 32],
        seller: [3u8; 32],
        anchor1: [0u8; 32],
    };
    let program = build_propose_payment(&reservation, &params)?;
    verify_propose_commitment(&program, &params)?;

    let recovered = decrypt_and_verify(&mut store, &key)?;
    if recovered != plaintext {
        bail!("decrypted plaintext does not match source file");
    }

    println!("clear root:  {}", hex::encode(buyer_clear_root));
    println!("cipher root: {}", hex::encode(buyer_cipher_root));
    println!("proposal accepted; {} plaintext bytes verified", recovered.len());
    Ok(())
}

/// Drives a buyer over a real HTTP round trip against an in-process
/// seller, wiring together every runnable piece: `xfer_transport::client`
/// for the wire hop, `InMemoryFundsSource` for the reservation,
/// `BuyerMachine` for the state transitions, and `Observer` against a
/// `MemoryLedger` standing in for the real chain, for the reveal wait.
/// The seller's own reaction (reveal promptly, or not) is simulated
/// in-process per `scenario`, since no real chain or counterparty
/// process is in scope here.
async fn buy(file: PathBuf, scenario: Scenario) -> Result<()> {
    let plaintext = std::fs::read(&file).with_context(|| format!("reading {}", file.display()))?;
    let key = [7u8; 32];
    let asset_id = [0xAu8; 32];
    let buyer_pub = [2u8; 32];
    let seller_pub = [3u8; 32];
    let reveal_deadline: u64 = 300;
    let refund_deadline: u64 = 600;

    let mut seller_sender = ChunkSender::new(&plaintext, 64, key);
    while seller_sender.next_chunk()?.is_some() {}
    let (true_root, _true_cipher_root) = seller_sender.finalize()?;

    let advertised_root = match scenario {
        Scenario::WrongRoot => {
            let mut bad = true_root;
            bad[0] ^= 0xff;
            bad
        }
        _ => true_root,
    };

    let catalog = Arc::new(SingleFileCatalog { root: advertised_root, plaintext: plaintext.clone(), key });
    let app = xfer_transport::router(catalog, 64);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.context("binding listener")?;
    let addr = listener.local_addr()?;
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let base_url = format!("http://{addr}");

    let mut funds = InMemoryFundsSource::new(vec![Utxo {
        anchor: [9u8; 32],
        amount: 100,
        asset_id,
        owner: buyer_pub,
    }]);
    let mut buyer = BuyerMachine::new();
    let (handle, reservation) = funds.reserve(100, asset_id).context("reserving funds")?;
    buyer.step(BuyerEvent::RequestPosted).expect("Idle accepts RequestPosted");

    let (session_id, reader) = request_content(&base_url, advertised_root, 100, asset_id, reveal_deadline, refund_deadline)
        .await
        .context("posting /request")?;
    let records = read_all_records(reader).await.context("reading chunk stream")?;

    let tmp = tempfile::NamedTempFile::new().context("creating temp chunk store")?;
    let mut store = FileChunkStore::create(tmp.path())?;
    let (clear_root, cipher_root) = receive_stream(&mut store, records.into_iter().map(Ok))?;
    let root_matches = clear_root == advertised_root;

    let actions = buyer
        .step(BuyerEvent::StreamClosed { clear_root_matches: root_matches })
        .expect("Requested accepts StreamClosed");

    if !root_matches {
        funds.cancel(handle).context("cancelling reservation after root mismatch")?;
        println!("aborted: streamed content's clear root does not match what was requested; reservation cancelled");
        return Ok(());
    }
    debug_assert!(actions.contains(&Action::SubmitProposal));

    let params = TransferParams {
        clear_root,
        cipher_root,
        amount: 100,
        asset_id,
        reveal_deadline,
        refund_deadline,
        buyer: buyer_pub,
        seller: seller_pub,
        anchor1: [0u8; 32],
    };
    let propose_program = build_propose_payment(&reservation, &params)?;
    let (parsed_propose, _) = parse_log(&propose_program)?;

    if matches!(scenario, Scenario::Silent) {
        funds.cancel(handle).context("cancelling reservation, buyer stays silent")?;
        println!("buyer stays silent; reservation cancelled, no proposal submitted");
        return Ok(());
    }

    let ledger = Arc::new(MemoryLedger::new(0, 50));
    let propose_receipt = ledger.submit(propose_program.clone()).context("submitting proposal to ledger")?;
    submit_proposal(&base_url, session_id, &propose_program)
        .await
        .context("posting /propose-payment")?;
    funds.commit(handle).context("committing reservation past the proposal commitment point")?;

    // The buyer already knows its own proposal landed (the submit above
    // returned successfully); start the observer's scan just past it so
    // the watch resolves on the next occurrence of this Anchor1, not an
    // echo of the submission the buyer itself just made.
    let cursor_dir = tempfile::TempDir::new().context("creating cursor store directory")?;
    let cursor_store = SledCursorStore::open(cursor_dir.path())?;
    cursor_store.store(propose_receipt.height)?;
    let cursor: Arc<dyn CursorStore> = Arc::new(cursor_store);
    let observer = Arc::new(Observer::new(ledger.clone(), cursor, Duration::from_millis(5)));
    let transfer_id = TransferId::new(clear_root, parsed_propose.anchor1);
    let (_watch_id, mut rx) = observer.register(transfer_id, buyer_pub, reveal_deadline);

    let cancel = CancellationToken::new();
    let observer_task = tokio::spawn(observer.clone().run(cancel.clone()));

    match scenario {
        Scenario::Happy => {
            // The seller's acceptance is recorded on-ledger by replaying the
            // escrow tuple alongside its reveal, so the combined log carries
            // both the `Escrow` marker (for `Anchor1`) and the `Merge`
            // reveal tail `parse_log_entries` expects together.
            let collateral = Reservation {
                inputs: vec![Utxo { anchor: [8u8; 32], amount: 100, asset_id, owner: seller_pub }],
                change: 0,
            };
            let reveal_program = build_reveal_key(&parsed_propose, &collateral, key, seller_pub)?;
            let combined: Vec<_> = propose_program.iter().cloned().chain(reveal_program).collect();
            ledger.submit(combined).context("submitting reveal to ledger")?;
        }
        Scenario::LateReveal => {
            while ledger.tip_time() <= reveal_deadline {
                ledger.submit(Vec::new()).context("advancing ledger past the reveal deadline")?;
            }
        }
        Scenario::Silent | Scenario::WrongRoot => unreachable!("handled above"),
    }

    let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .context("observer watch timed out")?
        .context("observer channel closed before delivering an event")?;

    cancel.cancel();
    let _ = observer_task.await;

    match event {
        ObserverEvent::Matched { reveal: Some(reveal), .. } => {
            buyer
                .step(BuyerEvent::RevealObserved { at_or_before_deadline: true })
                .expect("Proposed accepts RevealObserved");
            let recovered = decrypt_and_verify(&mut store, &reveal.key)?;
            if recovered != plaintext {
                bail!("decrypted plaintext does not match source file");
            }
            buyer.step(BuyerEvent::AllChunksValid).expect("Decrypting accepts AllChunksValid");
            println!("reveal observed; {} plaintext bytes verified; buyer done", recovered.len());
        }
        ObserverEvent::Matched { reveal: None, .. } => {
            bail!("observed the proposal's own submission with no reveal half");
        }
        ObserverEvent::DeadlineElapsed => {
            buyer.step(BuyerEvent::RevealDeadlineExpired).expect("Proposed accepts RevealDeadlineExpired");
            println!("reveal deadline elapsed with no reveal observed; buyer expired");
        }
    }
    Ok(())
}
