//! # m3tsz
//!
//! A streaming decoder for m3tsz, the Gorilla-derived time-series compression
//! format used by M3DB filesets.
//!
//! ## Format overview
//!
//! m3tsz extends the scheme from *"Gorilla: A Fast, Scalable, In-Memory Time
//! Series Database"* (VLDB 2015) in three ways:
//!
//! - **Timestamps** are delta-of-delta encoded in a per-unit bucket table, and
//!   the stream can switch time units mid-block through in-band markers.
//!   Markers also carry per-datapoint annotations and the end of the stream.
//!
//! - **Values** that are decimal numbers with at most six fractional digits are
//!   stored as scaled integer diffs. Everything else falls back to Gorilla's
//!   XOR float encoding, and the stream may switch between the two freely.
//!
//! - A datapoint that repeats both the previous delta and the previous value
//!   is a single short token (`001`, or `00` in float-only streams).
//!
//! The wire tables live in [`scheme`].
//!
//! ## Example
//!
//! ```rust
//! use m3tsz::{DataPoint, Encoder, Options, ReaderIterator, TimeUnit};
//!
//! let start = 1_609_459_200_000_000_000;
//! let opts = Options::default();
//!
//! let mut encoder = Encoder::new(start, opts);
//! encoder.encode(DataPoint::new(start, 12.0), TimeUnit::Second, None).unwrap();
//! encoder.encode(DataPoint::new(start + 60_000_000_000, 12.5), TimeUnit::Second, None).unwrap();
//! encoder.encode(DataPoint::new(start + 120_000_000_000, 13.0), TimeUnit::Second, Some(b"v2".as_slice())).unwrap();
//! let stream = encoder.finish();
//!
//! let mut iter = ReaderIterator::new(stream, opts);
//! while iter.next() {
//!     let (dp, unit, annotation) = iter.current();
//!     println!("{dp} {unit:?} {annotation:?}");
//! }
//! assert!(iter.err().is_none());
//! ```
//!
//! ## Collecting
//!
//! For small streams, [`Decoder::decode`] returns owned datapoints:
//!
//! ```rust
//! # use m3tsz::{DataPoint, Decoder, Encoder, Options, TimeUnit};
//! # let start = 1_609_459_200_000_000_000;
//! # let mut encoder = Encoder::new(start, Options::default());
//! # encoder.encode(DataPoint::new(start, 12.0), TimeUnit::Second, None).unwrap();
//! # let stream = encoder.finish();
//! let points = Decoder::decode(stream, Options::default()).unwrap();
//! assert_eq!(points[0].dp, DataPoint::new(start, 12.0));
//! assert_eq!(points[0].annotation, None);
//! ```

pub mod bitbuffer;
pub mod decoder;
pub mod encoder;
pub mod error;
pub mod fileset;
pub mod float;
pub mod inspect;
pub mod int;
pub mod options;
pub mod pool;
pub mod scheme;
pub mod timestamp;

// Re-export primary types at the crate root.
pub use decoder::{DataPoint, DecodedPoint, Decoder, IterState, ReaderIterator};
pub use encoder::Encoder;
pub use error::{DecodeError, EncodeError};
pub use options::Options;
pub use pool::{IteratorPool, PooledIterator, ReaderIteratorPool};
pub use scheme::TimeUnit;
