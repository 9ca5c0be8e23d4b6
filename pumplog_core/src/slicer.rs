//! Splits one page of the device history log into self-delimited records.
//!
//! Every record carries its own length in byte 2. That byte is the only
//! thing locating the next record, so a bad size ends the parse: there is
//! no marker to resynchronise on.

use crate::{Error, Result};

/// Offset of the size byte within a record
pub const SIZE_OFFSET: usize = 2;

/// One undecoded record cut from a page
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRecord {
    pub type_code: u8,
    pub declared_size: u8,
    pub bytes: Vec<u8>,
}

/// Lazy record iterator over a borrowed page
///
/// Yields `Err` once on the first malformed size and then stops.
pub struct PageSlicer<'a> {
    page: &'a [u8],
    pos: usize,
    failed: bool,
}

impl<'a> PageSlicer<'a> {
    pub fn new(page: &'a [u8]) -> Self {
        Self {
            page,
            pos: 0,
            failed: false,
        }
    }

    /// Bytes not yet handed out
    pub fn remaining(&self) -> usize {
        self.page.len() - self.pos
    }
}

impl Iterator for PageSlicer<'_> {
    type Item = Result<RawRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.pos >= self.page.len() {
            return None;
        }

        let remaining = self.remaining();
        let declared = match self.page.get(self.pos + SIZE_OFFSET) {
            Some(size) => *size as usize,
            None => {
                self.failed = true;
                return Some(Err(Error::MalformedRecord {
                    offset: self.pos,
                    declared: 0,
                    remaining,
                }));
            }
        };

        if declared == 0 || declared > remaining {
            self.failed = true;
            return Some(Err(Error::MalformedRecord {
                offset: self.pos,
                declared,
                remaining,
            }));
        }

        let bytes = self.page[self.pos..self.pos + declared].to_vec();
        self.pos += declared;

        Some(Ok(RawRecord {
            type_code: bytes[0],
            declared_size: declared as u8,
            bytes,
        }))
    }
}

impl std::iter::FusedIterator for PageSlicer<'_> {}

/// Slice a whole page, failing on the first malformed record
pub fn slice_page(page: &[u8]) -> Result<Vec<RawRecord>> {
    PageSlicer::new(page).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(code: u8, size: u8) -> Vec<u8> {
        let mut bytes = vec![0u8; size as usize];
        bytes[0] = code;
        bytes[SIZE_OFFSET] = size;
        bytes
    }

    #[test]
    fn test_slices_consecutive_records() {
        let mut page = record(0x1e, 12);
        page.extend(record(0x1f, 12));
        page.extend(record(0xdc, 26));

        let records = slice_page(&page).unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].type_code, 0x1e);
        assert_eq!(records[2].type_code, 0xdc);
        assert_eq!(records[2].bytes.len(), 26);
        assert_eq!(records[2].declared_size, 26);
    }

    #[test]
    fn test_empty_page_yields_nothing() {
        assert!(slice_page(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_zero_size_is_fatal() {
        let mut page = record(0x1e, 12);
        page.extend([0x1f, 0x00, 0x00, 0x01]);

        let mut slicer = PageSlicer::new(&page);
        assert!(slicer.next().unwrap().is_ok());
        let err = slicer.next().unwrap().unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedRecord {
                offset: 12,
                declared: 0,
                ..
            }
        ));
        assert!(slicer.next().is_none());
    }

    #[test]
    fn test_size_past_end_is_fatal() {
        let mut page = record(0x1e, 12);
        page.truncate(10);

        let err = slice_page(&page).unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedRecord {
                offset: 0,
                declared: 12,
                remaining: 10
            }
        ));
    }

    #[test]
    fn test_unreadable_size_byte_is_fatal() {
        let mut page = record(0x1e, 12);
        page.extend([0x1f, 0x00]);

        assert!(matches!(
            slice_page(&page),
            Err(Error::MalformedRecord { offset: 12, .. })
        ));
    }

    #[test]
    fn test_real_capture_slices() {
        let page = hex::decode("1e000c81ee52f6a092886601\
             1f000c81ee56b5a092886602")
            .unwrap();
        let records = slice_page(&page).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].bytes[11], 0x02);
    }
}
