//! JSON-lines event log: one serialized `SmokingEvent` per line, appended.
//! Historical storage and querying belong to the external log layer.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

use smokewatch_common::SmokingEvent;

use crate::error::Result;
use crate::events::EventSink;

pub struct JsonlEventSink {
    writer: BufWriter<File>,
}

impl JsonlEventSink {
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: BufWriter::new(file),
        })
    }
}

impl EventSink for JsonlEventSink {
    fn record(&mut self, event: &SmokingEvent) -> Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }
}
