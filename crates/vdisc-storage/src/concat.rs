use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;

use crate::error::{StorageError, StorageResult};
use crate::interval::Interval;
use crate::object::{read_full_at, Object, ObjectRef};

/// One addressable object over an ordered sequence of parts.
///
/// Parts are keyed by their starting offset. A read intersects the request
/// with each overlapping part and dispatches one sub-read per part, either on
/// the calling thread or, for the concurrent variant, on one scoped thread
/// per part. Both variants produce byte-identical results.
pub struct Concat {
    url: String,
    parts: BTreeMap<u64, ObjectRef>,
    size: u64,
    concurrent: bool,
}

/// One planned sub-read: which part, where in it, and where in the caller's
/// buffer.
struct SubRead {
    part: ObjectRef,
    part_off: u64,
    span: Interval,
}

impl Concat {
    /// Concatenate `parts` in order. Zero-length parts are dropped.
    pub fn new(url: impl Into<String>, parts: Vec<ObjectRef>, concurrent: bool) -> Self {
        let mut map = BTreeMap::new();
        let mut size = 0u64;
        for part in parts {
            let len = part.size();
            if len == 0 {
                continue;
            }
            map.insert(size, part);
            size += len;
        }
        Self {
            url: url.into(),
            parts: map,
            size,
            concurrent,
        }
    }

    /// Number of non-empty parts.
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// The part covering byte `off` and that part's starting offset.
    pub fn part_at(&self, off: u64) -> Option<(u64, &ObjectRef)> {
        let (&start, part) = self.parts.range(..=off).next_back()?;
        (off < start + part.size()).then_some((start, part))
    }

    fn plan(&self, want: Interval) -> Vec<SubRead> {
        let first = self
            .parts
            .range(..=want.start)
            .next_back()
            .map(|(&k, _)| k)
            .unwrap_or(0);
        self.parts
            .range(first..)
            .take_while(|(start, _)| **start < want.end)
            .filter_map(|(&start, part)| {
                let extent = Interval::at(start, part.size());
                extent.intersection(&want).map(|span| SubRead {
                    part: Arc::clone(part),
                    part_off: span.start - start,
                    span,
                })
            })
            .collect()
    }

    /// Validate a sub-read result. A short read is fine only if it ends the
    /// whole object.
    fn check(&self, sub: &SubRead, n: usize) -> StorageResult<usize> {
        if (n as u64) < sub.span.len() && sub.span.end < self.size {
            return Err(StorageError::UnexpectedEof);
        }
        Ok(n)
    }
}

impl Object for Concat {
    fn url(&self) -> &str {
        &self.url
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read_at(&self, buf: &mut [u8], off: u64) -> StorageResult<usize> {
        if off >= self.size || buf.is_empty() {
            return Ok(0);
        }
        let want = Interval::at(off, buf.len() as u64).intersection(&Interval::new(0, self.size));
        let Some(want) = want else {
            return Ok(0);
        };
        let subs = self.plan(want);
        let buf = &mut buf[..want.len() as usize];

        // Carve the caller's buffer into disjoint chunks, one per sub-read.
        let mut chunks = Vec::with_capacity(subs.len());
        let mut rest = buf;
        for sub in &subs {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(sub.span.len() as usize);
            chunks.push(head);
            rest = tail;
        }

        let results: Vec<StorageResult<usize>> = if self.concurrent && subs.len() > 1 {
            thread::scope(|s| {
                let handles: Vec<_> = subs
                    .iter()
                    .zip(chunks)
                    .map(|(sub, chunk)| {
                        s.spawn(move || read_full_at(sub.part.as_ref(), chunk, sub.part_off))
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|h| {
                        h.join().unwrap_or_else(|_| {
                            Err(StorageError::Io(std::io::Error::new(
                                std::io::ErrorKind::Other,
                                "concat part reader panicked",
                            )))
                        })
                    })
                    .collect()
            })
        } else {
            subs.iter()
                .zip(chunks)
                .map(|(sub, chunk)| read_full_at(sub.part.as_ref(), chunk, sub.part_off))
                .collect()
        };

        // Results are in offset order; the first error wins.
        let mut total = 0;
        for (sub, result) in subs.iter().zip(results) {
            let n = self.check(sub, result?)?;
            total += n;
            if (n as u64) < sub.span.len() {
                break;
            }
        }
        Ok(total)
    }

    fn close(&self) -> StorageResult<()> {
        let mut first_err = None;
        for part in self.parts.values() {
            if let Err(e) = part.close() {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

impl std::fmt::Debug for Concat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Concat")
            .field("url", &self.url)
            .field("parts", &self.parts.len())
            .field("size", &self.size)
            .field("concurrent", &self.concurrent)
            .finish()
    }
}

/// Concatenate `parts`, reading them serially on the calling thread.
pub fn concat(parts: Vec<ObjectRef>) -> ObjectRef {
    Arc::new(Concat::new("concat:", parts, false))
}

/// Concatenate `parts`, reading intersected parts in parallel.
pub fn concat_concurrent(parts: Vec<ObjectRef>) -> ObjectRef {
    Arc::new(Concat::new("concat:", parts, true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{BytesObject, ZeroObject};
    use crate::object::read_all;
    use proptest::prelude::*;

    fn bytes(url: &str, data: &[u8]) -> ObjectRef {
        Arc::new(BytesObject::new(url, data.to_vec()))
    }

    /// Claims a larger size than the bytes it can deliver.
    struct Truncated {
        inner: BytesObject,
        claimed: u64,
    }

    impl Object for Truncated {
        fn url(&self) -> &str {
            self.inner.url()
        }
        fn size(&self) -> u64 {
            self.claimed
        }
        fn read_at(&self, buf: &mut [u8], off: u64) -> StorageResult<usize> {
            self.inner.read_at(buf, off)
        }
    }

    fn three_parts(concurrent: bool) -> Concat {
        Concat::new(
            "concat:test",
            vec![
                bytes("mem://a", b"abcd"),
                bytes("mem://b", b"efghi"),
                bytes("mem://c", b"jklmno"),
            ],
            concurrent,
        )
    }

    #[test]
    fn spans_all_parts() {
        for concurrent in [false, true] {
            let c = three_parts(concurrent);
            assert_eq!(c.size(), 15);
            let mut buf = [0u8; 15];
            assert_eq!(c.read_at(&mut buf, 0).unwrap(), 15);
            assert_eq!(&buf, b"abcdefghijklmno");
        }
    }

    #[test]
    fn partial_window() {
        let c = three_parts(true);
        let mut buf = [0u8; 6];
        assert_eq!(c.read_at(&mut buf, 2).unwrap(), 6);
        assert_eq!(&buf, b"cdefgh");
    }

    #[test]
    fn read_past_end() {
        let c = three_parts(false);
        let mut buf = [0u8; 10];
        assert_eq!(c.read_at(&mut buf, 12).unwrap(), 3);
        assert_eq!(&buf[..3], b"mno");
        assert_eq!(c.read_at(&mut buf, 15).unwrap(), 0);
    }

    #[test]
    fn empty_parts_are_skipped() {
        let c = Concat::new(
            "concat:",
            vec![
                bytes("mem://a", b"ab"),
                Arc::new(ZeroObject::new(0)),
                bytes("mem://b", b"cd"),
            ],
            false,
        );
        assert_eq!(c.part_count(), 2);
        assert_eq!(read_all(&c).unwrap(), b"abcd");
    }

    #[test]
    fn short_middle_part_is_unexpected_eof() {
        for concurrent in [false, true] {
            let c = Concat::new(
                "concat:",
                vec![
                    bytes("mem://a", b"abcd"),
                    Arc::new(Truncated {
                        inner: BytesObject::new("mem://b", b"ef".to_vec()),
                        claimed: 5,
                    }),
                    bytes("mem://c", b"jklmno"),
                ],
                concurrent,
            );
            let mut buf = [0u8; 15];
            let err = c.read_at(&mut buf, 0).unwrap_err();
            assert!(matches!(err, StorageError::UnexpectedEof));
        }
    }

    #[test]
    fn short_last_part_is_eof() {
        let c = Concat::new(
            "concat:",
            vec![
                bytes("mem://a", b"abcd"),
                Arc::new(Truncated {
                    inner: BytesObject::new("mem://b", b"ef".to_vec()),
                    claimed: 5,
                }),
            ],
            true,
        );
        let mut buf = [0u8; 9];
        assert_eq!(c.read_at(&mut buf, 0).unwrap(), 6);
        assert_eq!(&buf[..6], b"abcdef");
    }

    #[test]
    fn part_lookup() {
        let c = three_parts(false);
        assert_eq!(c.part_at(0).map(|(s, _)| s), Some(0));
        assert_eq!(c.part_at(4).map(|(s, p)| (s, p.url().to_string())), Some((4, "mem://b".into())));
        assert_eq!(c.part_at(14).map(|(s, _)| s), Some(9));
        assert!(c.part_at(15).is_none());
    }

    proptest! {
        #[test]
        fn serial_and_concurrent_agree(
            lens in proptest::collection::vec(0usize..40, 1..8),
            off in 0u64..200,
            len in 0usize..200,
        ) {
            let mut all = Vec::new();
            let parts: Vec<ObjectRef> = lens
                .iter()
                .enumerate()
                .map(|(i, &n)| {
                    let data: Vec<u8> = (0..n).map(|j| (i * 31 + j) as u8).collect();
                    all.extend_from_slice(&data);
                    Arc::new(BytesObject::new(format!("mem://{i}"), data)) as ObjectRef
                })
                .collect();
            let serial = Concat::new("s", parts.clone(), false);
            let parallel = Concat::new("p", parts, true);

            let mut a = vec![0u8; len];
            let mut b = vec![0u8; len];
            let na = serial.read_at(&mut a, off).unwrap();
            let nb = parallel.read_at(&mut b, off).unwrap();
            prop_assert_eq!(na, nb);
            prop_assert_eq!(&a[..na], &b[..nb]);

            let start = (off as usize).min(all.len());
            let end = (start + len).min(all.len());
            prop_assert_eq!(&a[..na], &all[start..end]);
        }
    }
}
