//! `tether inspect`: decodes a capture of back-to-back messages.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use tether_proto::{Message, WireConfig, WireReader};

use crate::OutputFormat;

/// Arguments for `tether inspect`.
#[derive(clap::Args)]
pub struct InspectArgs {
    /// Capture file, as written by one side of a connection.
    pub file: PathBuf,

    /// Output format.
    #[arg(long, default_value = "table")]
    pub format: OutputFormat,
}

/// Messages decoded from one capture.
#[derive(Debug)]
pub struct Capture {
    pub messages: Vec<Message>,
    pub integrity_faults: u64,
}

/// Decodes messages until the stream ends at a message boundary.
pub fn decode<R: Read>(input: R, config: WireConfig) -> Result<Capture> {
    let mut reader = WireReader::new(input, config);
    let mut messages = Vec::new();
    while let Some(msg) = reader
        .try_recv()
        .with_context(|| format!("decoding message {}", messages.len()))?
    {
        messages.push(msg);
    }
    Ok(Capture {
        integrity_faults: reader.integrity_faults(),
        messages,
    })
}

pub fn inspect(args: &InspectArgs, config: WireConfig) -> Result<()> {
    let file =
        File::open(&args.file).with_context(|| format!("opening {}", args.file.display()))?;
    let capture = decode(BufReader::new(file), config)?;

    if matches!(args.format, OutputFormat::Json) {
        let obj = serde_json::json!({
            "messages": capture.messages,
            "integrity_faults": capture.integrity_faults,
        });
        println!("{}", serde_json::to_string_pretty(&obj)?);
        return Ok(());
    }

    if capture.messages.is_empty() {
        println!("No messages.");
    } else {
        println!("{:>5}  {:<10} {:<34} STATUS", "#", "FAMILY", "TYPE");
        for (i, msg) in capture.messages.iter().enumerate() {
            let (family, status) = summary(msg);
            println!("{i:>5}  {family:<10} {:<34} {status}", msg.name());
        }
    }
    if capture.integrity_faults > 0 {
        eprintln!(
            "warning: {} compressed section(s) failed the integrity check",
            capture.integrity_faults
        );
    }
    Ok(())
}

/// Family label and outcome column of one table row.
fn summary(msg: &Message) -> (&'static str, String) {
    match msg {
        Message::Directive(_) => ("directive", String::new()),
        Message::Reply(r) if r.ok => ("reply", "ok".to_owned()),
        Message::Reply(r) => (
            "reply",
            format!("failed: {}", r.error.as_deref().unwrap_or("-")),
        ),
        _ => ("?", String::new()),
    }
}

#[cfg(test)]
mod tests {
    use tether_proto::{ClassQuery, Directive, Reply, ReplyBody, Signal, WireWriter};

    use super::*;

    fn capture(messages: &[Message]) -> Vec<u8> {
        let writer = WireWriter::new(Vec::new(), WireConfig::default());
        for msg in messages {
            writer.send(msg).unwrap();
        }
        writer.into_inner().unwrap()
    }

    #[test]
    fn decodes_every_message() {
        let sent = [
            Message::from(Directive::from(Signal::GetVmProperties)),
            Message::from(Directive::GetClassId(ClassQuery::new("Main", 0))),
            Message::from(Reply::with_body(ReplyBody::ClassId(9))),
            Message::from(Reply::failed("no such class")),
        ];
        let bytes = capture(&sent);

        let decoded = decode(bytes.as_slice(), WireConfig::default()).unwrap();
        assert_eq!(decoded.messages, sent);
        assert_eq!(decoded.integrity_faults, 0);

        assert_eq!(summary(&decoded.messages[0]), ("directive", String::new()));
        assert_eq!(summary(&decoded.messages[2]), ("reply", "ok".to_owned()));
        assert_eq!(
            summary(&decoded.messages[3]),
            ("reply", "failed: no such class".to_owned())
        );
    }

    #[test]
    fn empty_capture() {
        let decoded = decode(std::io::empty(), WireConfig::default()).unwrap();
        assert!(decoded.messages.is_empty());
    }

    #[test]
    fn truncated_capture_names_the_message() {
        let mut bytes = capture(&[
            Message::from(Directive::from(Signal::RunGc)),
            Message::from(Directive::GetClassId(ClassQuery::new("Main", 0))),
        ]);
        bytes.truncate(bytes.len() - 2);

        let err = decode(bytes.as_slice(), WireConfig::default()).unwrap_err();
        assert!(format!("{err:#}").contains("decoding message 1"), "{err:#}");
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.bin");
        std::fs::write(&path, capture(&[Message::from(Reply::ack())])).unwrap();

        let args = InspectArgs {
            file: path,
            format: OutputFormat::Json,
        };
        inspect(&args, WireConfig::default()).unwrap();
    }
}
