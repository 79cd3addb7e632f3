//! VtdXml - Virtual Token Descriptor indexing for XML
//!
//! Parses a document in one pass into a compact, non-extractive index:
//! 64-bit token records pointing into the original bytes plus a location
//! cache of element positions. Nothing is copied out of the document.
//!
//! Modules:
//! - core: encoding detection, decoding, the lexer state machine
//! - index: token records, location cache, the `VtdIndex` and persistence
//! - generator / source: the reusable `VtdGen` and its file and URL adapters
//! - strategy: parallel batch parsing
//!
//! The crate is loaded by the BEAM as `Elixir.VtdXml.Native`.

use rustler::{Binary, Encoder, Env, NifResult, ResourceArc, Term};

pub mod config;
pub mod core;
pub mod error;
pub mod generator;
pub mod index;
mod resource;
pub mod source;
pub mod strategy;
mod term;

pub use config::{LcDepth, ParserConfig};
pub use error::{IndexError, ParseError, Position};
pub use generator::VtdGen;
pub use index::{LcEntry, LocationCache, PackedToken, Token, TokenType, VtdIndex};

use resource::{IndexRef, IndexResource};
use term::{bytes_to_binary, index_error_to_term, parse_error_to_term, tokens_to_term};

// ============================================================================
// Allocator Configuration
// ============================================================================

#[cfg(feature = "memory_tracking")]
mod tracking {
    use std::alloc::{GlobalAlloc, Layout};
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub static ALLOCATED: AtomicUsize = AtomicUsize::new(0);
    pub static PEAK_ALLOCATED: AtomicUsize = AtomicUsize::new(0);

    pub struct TrackingAllocator;

    #[cfg(feature = "mimalloc")]
    static UNDERLYING: mimalloc::MiMalloc = mimalloc::MiMalloc;

    #[cfg(not(feature = "mimalloc"))]
    static UNDERLYING: std::alloc::System = std::alloc::System;

    unsafe impl GlobalAlloc for TrackingAllocator {
        unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
            let ptr = UNDERLYING.alloc(layout);
            if !ptr.is_null() {
                let current = ALLOCATED.fetch_add(layout.size(), Ordering::Relaxed) + layout.size();
                let mut peak = PEAK_ALLOCATED.load(Ordering::Relaxed);
                while current > peak {
                    match PEAK_ALLOCATED.compare_exchange_weak(
                        peak,
                        current,
                        Ordering::Relaxed,
                        Ordering::Relaxed,
                    ) {
                        Ok(_) => break,
                        Err(p) => peak = p,
                    }
                }
            }
            ptr
        }

        unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
            ALLOCATED.fetch_sub(layout.size(), Ordering::Relaxed);
            UNDERLYING.dealloc(ptr, layout)
        }
    }
}

#[cfg(feature = "memory_tracking")]
#[global_allocator]
static GLOBAL: tracking::TrackingAllocator = tracking::TrackingAllocator;

#[cfg(all(feature = "mimalloc", not(feature = "memory_tracking")))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

// ============================================================================
// Memory Tracking NIFs
// ============================================================================

#[cfg(feature = "memory_tracking")]
use std::sync::atomic::Ordering;

#[cfg(feature = "memory_tracking")]
#[rustler::nif]
fn get_rust_memory() -> usize {
    tracking::ALLOCATED.load(Ordering::SeqCst)
}

#[cfg(feature = "memory_tracking")]
#[rustler::nif]
fn get_rust_memory_peak() -> usize {
    tracking::PEAK_ALLOCATED.load(Ordering::SeqCst)
}

#[cfg(feature = "memory_tracking")]
#[rustler::nif]
fn reset_rust_memory_stats() -> (usize, usize) {
    let current = tracking::ALLOCATED.load(Ordering::SeqCst);
    let peak = tracking::PEAK_ALLOCATED.swap(current, Ordering::SeqCst);
    (current, peak)
}

#[cfg(not(feature = "memory_tracking"))]
#[rustler::nif]
fn get_rust_memory() -> usize {
    0
}

#[cfg(not(feature = "memory_tracking"))]
#[rustler::nif]
fn get_rust_memory_peak() -> usize {
    0
}

#[cfg(not(feature = "memory_tracking"))]
#[rustler::nif]
fn reset_rust_memory_stats() -> (usize, usize) {
    (0, 0)
}

// ============================================================================
// Parsing
// ============================================================================

fn index_result<'a>(env: Env<'a>, result: Result<VtdIndex, ParseError>) -> Term<'a> {
    match result {
        Ok(index) => (term::ok(), ResourceArc::new(IndexResource::new(index))).encode(env),
        Err(err) => parse_error_to_term(env, &err),
    }
}

/// Parse a binary (returns {:ok, index} or {:error, {kind, message}})
#[rustler::nif]
fn parse<'a>(env: Env<'a>, input: Binary<'a>, namespace_aware: bool) -> NifResult<Term<'a>> {
    let result = VtdGen::new().parse(input.as_slice().to_vec(), namespace_aware);
    Ok(index_result(env, result))
}

/// Parse with whitespace recording and a location cache depth
/// ("shallow", "full" or "auto")
#[rustler::nif]
fn parse_with_options<'a>(
    env: Env<'a>,
    input: Binary<'a>,
    namespace_aware: bool,
    record_whitespace: bool,
    lc_depth: &str,
) -> NifResult<Term<'a>> {
    let lc_depth = LcDepth::from_name(lc_depth).ok_or(rustler::Error::BadArg)?;
    let config = ParserConfig::default()
        .with_whitespace(record_whitespace)
        .with_lc_depth(lc_depth);
    let result = VtdGen::with_config(config).parse(input.as_slice().to_vec(), namespace_aware);
    Ok(index_result(env, result))
}

/// File and URL adapters only report success; details go to the log
fn file_result<'a>(env: Env<'a>, mut gen: VtdGen, parsed: bool) -> Term<'a> {
    match gen.take_index() {
        Some(index) if parsed => (term::ok(), ResourceArc::new(IndexResource::new(index))).encode(env),
        _ => term::error().encode(env),
    }
}

#[rustler::nif(schedule = "DirtyIo")]
fn parse_file<'a>(env: Env<'a>, path: String, namespace_aware: bool) -> NifResult<Term<'a>> {
    let mut gen = VtdGen::new();
    let parsed = gen.parse_file(&path, namespace_aware);
    Ok(file_result(env, gen, parsed))
}

#[rustler::nif(schedule = "DirtyIo")]
fn parse_gzip_file<'a>(env: Env<'a>, path: String, namespace_aware: bool) -> NifResult<Term<'a>> {
    let mut gen = VtdGen::new();
    let parsed = gen.parse_gzip_file(&path, namespace_aware);
    Ok(file_result(env, gen, parsed))
}

#[rustler::nif(schedule = "DirtyIo")]
fn parse_zip_file<'a>(env: Env<'a>, path: String, entry: String, namespace_aware: bool) -> NifResult<Term<'a>> {
    let mut gen = VtdGen::new();
    let parsed = gen.parse_zip_file(&path, &entry, namespace_aware);
    Ok(file_result(env, gen, parsed))
}

#[rustler::nif(schedule = "DirtyIo")]
fn parse_http_url<'a>(env: Env<'a>, url: String, namespace_aware: bool) -> NifResult<Term<'a>> {
    let mut gen = VtdGen::new();
    let parsed = gen.parse_http_url(&url, namespace_aware);
    Ok(file_result(env, gen, parsed))
}

/// Parse many documents on the rayon pool
#[rustler::nif(schedule = "DirtyCpu")]
fn parse_batch<'a>(env: Env<'a>, inputs: Vec<Binary<'a>>, namespace_aware: bool) -> NifResult<Term<'a>> {
    let docs: Vec<Vec<u8>> = inputs.iter().map(|b| b.as_slice().to_vec()).collect();
    let results = strategy::parse_batch(docs, namespace_aware, ParserConfig::default());

    let mut list = Term::list_new_empty(env);
    for result in results.into_iter().rev() {
        list = list.list_prepend(index_result(env, result));
    }
    Ok(list)
}

// ============================================================================
// Index Access
// ============================================================================

#[rustler::nif]
fn token_count(index_ref: IndexRef) -> usize {
    index_ref.index().token_count()
}

/// All tokens as {type, depth, offset, length}
#[rustler::nif]
fn tokens<'a>(env: Env<'a>, index_ref: IndexRef) -> Term<'a> {
    tokens_to_term(env, index_ref.index())
}

#[rustler::nif]
fn root_index(index_ref: IndexRef) -> Option<u32> {
    index_ref.index().root_index()
}

#[rustler::nif]
fn encoding(index_ref: IndexRef) -> &'static str {
    index_ref.index().encoding().name()
}

/// Text of one token, decoded to UTF-8; entity references are left as written
#[rustler::nif]
fn token_text<'a>(env: Env<'a>, index_ref: IndexRef, token: usize) -> NifResult<Term<'a>> {
    let index = index_ref.index();
    index.get_token(token).ok_or(rustler::Error::BadArg)?;
    match index.raw_string(token) {
        Ok(text) => Ok(text.encode(env)),
        Err(err) => Ok(parse_error_to_term(env, &err)),
    }
}

// ============================================================================
// Persistence
// ============================================================================

/// Index with the document embedded
#[rustler::nif]
fn write_index<'a>(env: Env<'a>, index_ref: IndexRef) -> Term<'a> {
    bytes_to_binary(env, &index_ref.index().to_index_bytes())
}

/// Index only; load it back together with the document
#[rustler::nif]
fn write_separate_index<'a>(env: Env<'a>, index_ref: IndexRef) -> Term<'a> {
    bytes_to_binary(env, &index_ref.index().to_separate_index_bytes())
}

#[rustler::nif]
fn load_index<'a>(env: Env<'a>, bytes: Binary<'a>) -> NifResult<Term<'a>> {
    match VtdIndex::read_index(bytes.as_slice()) {
        Ok(index) => Ok((term::ok(), ResourceArc::new(IndexResource::new(index))).encode(env)),
        Err(err) => Ok(index_error_to_term(env, &err)),
    }
}

#[rustler::nif]
fn load_separate_index<'a>(env: Env<'a>, bytes: Binary<'a>, doc: Binary<'a>) -> NifResult<Term<'a>> {
    match VtdIndex::read_separate_index(bytes.as_slice(), doc.as_slice().to_vec()) {
        Ok(index) => Ok((term::ok(), ResourceArc::new(IndexResource::new(index))).encode(env)),
        Err(err) => Ok(index_error_to_term(env, &err)),
    }
}

// ============================================================================
// NIF Initialization
// ============================================================================

rustler::init!("Elixir.VtdXml.Native");
