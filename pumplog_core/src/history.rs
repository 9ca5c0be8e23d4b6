//! The decoded history of one device.
//!
//! Pages are decoded one at a time and dropped; their events accumulate in
//! recording order. Correlation refers to events by index into this vector.

use crate::event::{code, HistoryEvent};
use crate::slicer::PageSlicer;
use crate::Result;

/// Outcome of testing one event during a neighbour scan
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scan {
    Match,
    Continue,
    /// Give up; nothing past this event can match
    Stop,
}

impl From<bool> for Scan {
    fn from(matched: bool) -> Self {
        if matched {
            Scan::Match
        } else {
            Scan::Continue
        }
    }
}

/// Ordered, immutable-once-built event vector
#[derive(Debug, Default)]
pub struct HistoryLog {
    events: Vec<HistoryEvent>,
    /// A TIME_RESET is echoed by the next USER_TIME_DATE_CHANGE
    skip_next_time_change: bool,
}

impl HistoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every page in order
    pub fn from_pages<I, P>(pages: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<[u8]>,
    {
        let mut log = Self::new();
        for page in pages {
            log.push_page(page.as_ref())?;
        }
        Ok(log)
    }

    /// Slice and decode one page, returning how many events were kept
    pub fn push_page(&mut self, page: &[u8]) -> Result<usize> {
        let before = self.events.len();

        for raw in PageSlicer::new(page) {
            let event = HistoryEvent::decode(raw?)?;

            match event.code() {
                code::TIME_RESET => {
                    tracing::debug!("TIME_RESET at {}, ignoring next user time change", event.counter());
                    self.skip_next_time_change = true;
                }
                code::USER_TIME_DATE_CHANGE if self.skip_next_time_change => {
                    self.skip_next_time_change = false;
                    continue;
                }
                _ => {}
            }

            self.events.push(event);
        }

        let added = self.events.len() - before;
        tracing::debug!("Decoded {} events from {} byte page", added, page.len());
        Ok(added)
    }

    pub fn events(&self) -> &[HistoryEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEvent> {
        self.events.get(index)
    }

    pub fn last(&self) -> Option<&HistoryEvent> {
        self.events.last()
    }

    /// Nearest index before `from` that matches
    pub fn scan_back<F, S>(&self, from: usize, mut test: F) -> Option<usize>
    where
        F: FnMut(&HistoryEvent) -> S,
        S: Into<Scan>,
    {
        let end = from.min(self.events.len());
        for i in (0..end).rev() {
            match test(&self.events[i]).into() {
                Scan::Match => return Some(i),
                Scan::Continue => {}
                Scan::Stop => return None,
            }
        }
        None
    }

    /// Nearest index after `from` that matches
    pub fn scan_forward<F, S>(&self, from: usize, mut test: F) -> Option<usize>
    where
        F: FnMut(&HistoryEvent) -> S,
        S: Into<Scan>,
    {
        for i in from.saturating_add(1)..self.events.len() {
            match test(&self.events[i]).into() {
                Scan::Match => return Some(i),
                Scan::Continue => {}
                Scan::Stop => return None,
            }
        }
        None
    }

    /// Events of the given type codes, with their indices
    pub fn of_type<'a>(
        &'a self,
        codes: &'a [u8],
    ) -> impl Iterator<Item = (usize, &'a HistoryEvent)> + 'a {
        self.events
            .iter()
            .enumerate()
            .filter(move |(_, e)| codes.contains(&e.code()))
    }
}
