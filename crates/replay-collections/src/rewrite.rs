//! Content rewriting seam.
//!
//! Byte-level URL rewriting of HTML/CSS/JS bodies belongs to an external
//! rewriting engine plugged in through [`ContentRewriter`]. The default
//! [`HeadInsertRewriter`] only places the replay head block into HTML
//! documents and passes every other body through untouched.

use bytes::{Bytes, BytesMut};
use replay_core::{Destination, Exchange, ReplayError};

/// Per-response inputs handed to a [`ContentRewriter`].
#[derive(Debug, Clone)]
pub struct RewriteContext<'a> {
    /// Collection prefix, e.g. `/w/site/`.
    pub prefix: &'a str,
    pub url: &'a str,
    pub timestamp: &'a str,
    pub modifier: &'a str,
    pub destination: &'a Destination,
    /// Head block for HTML documents. `None` when no insert applies.
    pub head_insert: Option<&'a str>,
}

/// External body-rewriting engine.
pub trait ContentRewriter: Send + Sync {
    fn rewrite(&self, exchange: &mut Exchange, ctx: &RewriteContext<'_>) -> Result<(), ReplayError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct HeadInsertRewriter;

impl ContentRewriter for HeadInsertRewriter {
    fn rewrite(&self, exchange: &mut Exchange, ctx: &RewriteContext<'_>) -> Result<(), ReplayError> {
        let Some(insert) = ctx.head_insert else {
            return Ok(());
        };
        if exchange.mime_type().as_deref() != Some("text/html") {
            return Ok(());
        }
        exchange.body = insert_after_head(&exchange.body, insert.as_bytes());
        Ok(())
    }
}

/// Insert `block` right after the first `<head ...>` tag, or at the start
/// of the body when there is none.
fn insert_after_head(body: &[u8], block: &[u8]) -> Bytes {
    let at = find_head_end(body).unwrap_or(0);
    let mut out = BytesMut::with_capacity(body.len() + block.len());
    out.extend_from_slice(&body[..at]);
    out.extend_from_slice(block);
    out.extend_from_slice(&body[at..]);
    out.freeze()
}

fn find_head_end(body: &[u8]) -> Option<usize> {
    let mut from = 0;
    while let Some(offset) = body[from..]
        .windows(5)
        .position(|w| w.eq_ignore_ascii_case(b"<head"))
    {
        let start = from + offset;
        // Skip `<header>`.
        if matches!(body.get(start + 5), Some(b'>' | b' ' | b'\t' | b'\n' | b'\r')) {
            let close = body[start..].iter().position(|&b| b == b'>')?;
            return Some(start + close + 1);
        }
        from = start + 5;
    }
    None
}
