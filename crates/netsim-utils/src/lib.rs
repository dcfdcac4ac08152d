//! Utilities for reading and writing netsim scenarios.

#![warn(unreachable_pub, missing_debug_implementations, missing_docs)]

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use netsim_core::{Scenario, Simulation};

/// Reads a [`Scenario`] from a file and builds it into a [`Simulation`].
pub fn read_simulation(path: impl AsRef<Path>) -> Result<(Scenario, Simulation), Error> {
    let scenario = read_scenario(path)?;
    let sim = scenario.build()?;
    Ok((scenario, sim))
}

/// Reads a [`Scenario`] from a file in JSON, Dhall or MessagePack format, chosen by extension.
pub fn read_scenario(path: impl AsRef<Path>) -> Result<Scenario, Error> {
    let path = path.as_ref();
    let scenario: Scenario = match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => {
            let contents = std::fs::read_to_string(path)?;
            serde_json::from_str(&contents)?
        }
        Some("dhall") => {
            let contents = std::fs::read_to_string(path)?;
            serde_dhall::from_str(&contents).parse().map_err(Box::new)?
        }
        Some("msgpack") => {
            let f = File::open(path)?;
            let reader = BufReader::new(f);
            rmp_serde::decode::from_read(reader)?
        }
        _ => return Err(Error::UnknownFileType(path.into())),
    };
    log::debug!("read scenario `{}` from {}", scenario.name, path.display());
    Ok(scenario)
}

/// Writes a [`Scenario`] to a file in JSON or MessagePack format, chosen by extension.
pub fn write_scenario(scenario: &Scenario, path: impl AsRef<Path>) -> Result<(), Error> {
    let path = path.as_ref();
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("json") => {
            let writer = BufWriter::new(File::create(path)?);
            serde_json::to_writer_pretty(writer, scenario)?;
        }
        Some("msgpack") => {
            let mut writer = BufWriter::new(File::create(path)?);
            rmp_serde::encode::write_named(&mut writer, scenario)?;
        }
        _ => return Err(Error::UnknownFileType(path.into())),
    }
    Ok(())
}

/// Error kinds for scenario files and I/O.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Unknown file type.
    #[error("unknown file type: {0}")]
    UnknownFileType(PathBuf),

    /// Error deserializing Dhall.
    #[error("Dhall error")]
    Dhall(#[from] Box<serde_dhall::Error>),

    /// Error serializing/deserializing JSON.
    #[error("JSON error")]
    Json(#[from] serde_json::Error),

    /// Error deserializing MsgPack.
    #[error("MsgPack decode error")]
    MsgPackDecode(#[from] rmp_serde::decode::Error),

    /// Error serializing MsgPack.
    #[error("MsgPack encode error")]
    MsgPackEncode(#[from] rmp_serde::encode::Error),

    /// I/O error.
    #[error("IO error")]
    Io(#[from] std::io::Error),

    /// The scenario does not describe a valid simulation.
    #[error("invalid scenario")]
    Simulation(#[from] netsim_core::Error),
}
