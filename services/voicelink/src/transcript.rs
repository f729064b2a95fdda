//! User-facing transcript on stdout, kept apart from the log output.

use std::io::{self, Write};
use voicelink_core::SessionEvent;

pub struct Transcript<W: Write> {
    out: W,
    mid_line: bool,
}

impl<W: Write> Transcript<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            mid_line: false,
        }
    }

    pub fn handle(&mut self, event: &SessionEvent) -> io::Result<()> {
        match event {
            SessionEvent::TextDelta(delta) => {
                if !self.mid_line {
                    write!(self.out, "Assistant: ")?;
                    self.mid_line = true;
                }
                write!(self.out, "{delta}")?;
                self.out.flush()
            }
            SessionEvent::ResponseCompleted { .. } if self.mid_line => {
                self.mid_line = false;
                writeln!(self.out)?;
                self.out.flush()
            }
            _ => Ok(()),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
