use std::process::ExitCode;

use clap::Parser;
use log::error;
use pretty_hex::PrettyHex;
use snapstore::{
    config::{self, BackendKind},
    open_serializer, Config, PersistSnapshotSerializer, Snapshot, SnapshotSerializer,
};
mod opt;

fn main() -> ExitCode {
    env_logger::init();
    let cli = opt::Cli::parse();

    let mut config = match &cli.config {
        Some(file) => match config::load_config_from(file) {
            Ok(c) => c,
            Err(e) => {
                error!("{}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Config::default(),
    };
    if let Some(path) = cli.path {
        config.path = path.into();
    }
    // only files outlive the process
    config.backend = BackendKind::Local;

    let ser = match open_serializer(&config) {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    let res = match cli.command {
        opt::Commands::List => list(&ser),
        opt::Commands::Show(opts) => show(&ser, &opts.name, opts.seq),
        opt::Commands::History { name } => history(&ser, &name),
        opt::Commands::Verify => verify(&ser),
        opt::Commands::Dump { name } => dump(&ser, &name),
    };
    match res {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{} ({:?})", e, e.kind());
            ExitCode::FAILURE
        }
    }
}

fn list(ser: &PersistSnapshotSerializer) -> snapstore::Result<bool> {
    for name in ser.list_snapshots()? {
        println!("{}", name);
    }
    Ok(true)
}

fn print_snapshot(s: &Snapshot) {
    println!(
        "name {}, sequence {}, created_at {}, models {}, workers {}",
        s.name,
        s.sequence,
        s.created_at,
        s.models.len(),
        s.total_workers()
    );
    for m in &s.models {
        let params: Vec<String> = m
            .runtime_params
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        println!(
            "  {}:{} workers {} [{}]",
            m.model_name,
            m.version,
            m.worker_count,
            params.join(",")
        );
    }
}

fn show(ser: &PersistSnapshotSerializer, name: &str, seq: Option<u64>) -> snapstore::Result<bool> {
    let s = match seq {
        Some(seq) => ser.get_snapshot_at(name, seq)?,
        None => ser.get_snapshot(name)?,
    };
    print_snapshot(&s);
    Ok(true)
}

fn history(ser: &PersistSnapshotSerializer, name: &str) -> snapstore::Result<bool> {
    for seq in ser.history(name)? {
        println!("{}", seq);
    }
    Ok(true)
}

fn verify(ser: &PersistSnapshotSerializer) -> snapstore::Result<bool> {
    let mut ok = true;
    for name in ser.list_snapshots()? {
        match ser.get_snapshot(&name) {
            Ok(s) => println!("ok,{},{}", name, s.sequence),
            Err(e) if e.kind() == snapstore::ErrorKind::MalformedSnapshot => {
                ok = false;
                println!("malformed,{},{}", name, e);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(ok)
}

fn dump(ser: &PersistSnapshotSerializer, name: &str) -> snapstore::Result<bool> {
    let bytes = ser.raw_snapshot(name)?;
    println!("{:?}", bytes.as_ref().hex_dump());
    Ok(true)
}
