//! Dispatches a parsed request to the seven `/sln/` routes from
//! `spec.md` §6, wiring together auth, submissions, and the filter/query
//! engine. Each handler returns a fully-formed `Response`; errors map
//! through `SlnError::http_status` into the plain-text body format from
//! §7.

use super::request::{parse_form_urlencoded, ParsedRequest};
use super::status::Response;
use crate::auth;
use crate::error::{SlnError, SlnResult};
use crate::filter::{self, Filter};
use crate::hasher::parse_hash_uri;
use crate::query::{self, QueryStreamer};
use crate::repo::Repository;
use crate::session::{CookieSecret, Session, SessionMode};
use crate::submission::{load_file_row, resolve_file_id_by_uri, Submission};
use std::sync::Arc;
use tracing::{info, warn};

/// Everything a route handler needs besides the request itself.
pub struct Context {
    pub repo: Arc<Repository>,
    pub cookie_ttl_secs: u64,
}

/// A streaming success response: head bytes, followed by chunks
/// produced lazily. Non-chunked routes use `Fixed` instead.
pub enum Dispatched {
    Fixed(Response),
    Chunked { head: Response, streamer: QueryStreamer },
}

pub async fn dispatch(ctx: &Context, req: &ParsedRequest) -> Dispatched {
    let result = match (req.method.as_str(), req.path.as_str()) {
        ("POST", "/sln/auth") => handle_auth(ctx, req).await.map(Dispatched::Fixed),
        ("GET", p) | ("HEAD", p) if p.starts_with("/sln/file/") => {
            handle_fetch(ctx, req).await.map(Dispatched::Fixed)
        }
        ("POST", "/sln/file") => handle_store(ctx, req).await.map(Dispatched::Fixed),
        ("GET", "/sln/query") => handle_query_get(ctx, req).await,
        ("POST", "/sln/query") => handle_query_post(ctx, req).await,
        ("GET", "/sln/metafiles") => handle_fixed_filter(ctx, req, Filter::MetaFile),
        ("GET", "/sln/query-obsolete") => handle_fixed_filter(ctx, req, Filter::ObsoleteMetaFile),
        _ => Err(SlnError::NotFound),
    };

    match result {
        Ok(dispatched) => dispatched,
        Err(e) => {
            warn!(error = %e, method = %req.method, path = %req.path, "request failed");
            Dispatched::Fixed(Response::plain_error(e.http_status(), &e.to_string()))
        }
    }
}

fn resolve_session(ctx: &Context, req: &ParsedRequest) -> Option<Session> {
    if let Some(raw) = req.cookie("s") {
        if let Some(session) = ctx.repo.sessions.lookup(&CookieSecret(raw)) {
            return Some(session);
        }
    }
    if ctx.repo.public_read {
        Some(Session::anonymous(ctx.repo.sessions.alloc_id(), true))
    } else {
        None
    }
}

async fn handle_auth(ctx: &Context, req: &ParsedRequest) -> SlnResult<Response> {
    if req.body.len() > super::request::MAX_AUTH_BODY_SIZE {
        return Err(SlnError::Einval("auth body too large".into()));
    }
    let fields = parse_form_urlencoded(&req.body);
    let user = fields
        .iter()
        .find(|(k, _)| k == "user")
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| SlnError::Einval("missing user".into()))?;
    let pass = fields
        .iter()
        .find(|(k, _)| k == "pass")
        .map(|(_, v)| v.as_str())
        .ok_or_else(|| SlnError::Einval("missing pass".into()))?;

    let txn = ctx.repo.env.begin(false)?;
    let user_id = auth::authenticate(&*txn, user, pass)?;

    let secret = crate::nonce::random_token(24);
    let session = Session {
        id: ctx.repo.sessions.alloc_id(),
        user_id: Some(user_id),
        created_at: std::time::SystemTime::now(),
        mode: SessionMode::ReadWrite,
    };
    let cookie_value = session.cookie(&secret);
    ctx.repo.sessions.insert(CookieSecret(cookie_value.clone()), session);

    info!(user, "authenticated");
    Ok(Response::new(200).header(
        "Set-Cookie",
        format!("s={cookie_value}; Max-Age={}; HttpOnly; Path=/", ctx.cookie_ttl_secs),
    ))
}

async fn handle_fetch(ctx: &Context, req: &ParsedRequest) -> SlnResult<Response> {
    let session = resolve_session(ctx, req).ok_or(SlnError::Eacces)?;

    let rest = req
        .path
        .strip_prefix("/sln/file/")
        .ok_or_else(|| SlnError::Einval("malformed fetch path".into()))?;
    let (algo, hash) = rest.split_once('/').ok_or_else(|| SlnError::Einval("malformed fetch path".into()))?;
    let uri = crate::hasher::hash_uri(algo, hash);

    let txn = ctx.repo.env.begin(false)?;
    let file_id = resolve_file_id_by_uri(&*txn, &uri)?.ok_or(SlnError::NotFound)?;
    let row = load_file_row(&*txn, file_id)?.ok_or(SlnError::NotFound)?;
    drop(txn);

    if !ctx.repo.can_read(&session, &row) {
        return Err(SlnError::Eacces);
    }

    let internal_hash = internal_hash_for(&ctx.repo, &row)?;
    let path = ctx.repo.internal_path(&internal_hash);
    let body = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        // The index knows about this file but the blob is gone from disk:
        // 410, distinct from the 404 an unknown URI gets.
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Ok(Response::plain_error(410, "content missing from store"));
        }
        Err(e) => return Err(e.into()),
    };

    let resp = Response::new(200)
        .header("Content-Type", row.mime_type.clone())
        .header("Cache-Control", "max-age=31536000")
        .header("Content-Security-Policy", "'none'")
        .header("X-Content-Type-Options", "nosniff")
        .body(if req.method == "HEAD" { Vec::new() } else { body });
    Ok(resp)
}

/// The `Files` row only stores the URI that named the lookup; the
/// on-disk shard path needs the canonical SHA-256 hex, which is the
/// primary URI's hash component.
fn internal_hash_for(_repo: &Repository, row: &crate::submission::FileRow) -> SlnResult<String> {
    let (_, hash) = parse_hash_uri(&row.primary_uri).ok_or_else(|| SlnError::Panic("primary URI is not a hash URI".into()))?;
    Ok(hash.to_string())
}

async fn handle_store(ctx: &Context, req: &ParsedRequest) -> SlnResult<Response> {
    let session = resolve_session(ctx, req).ok_or(SlnError::Eacces)?;
    let content_type = req
        .header("content-type")
        .ok_or_else(|| SlnError::Einval("Content-Type required".into()))?
        .to_string();

    let mut sub = Submission::create(ctx.repo.clone(), &session, &content_type, None).await?;
    sub.write(&req.body).await?;
    sub.end().await?;
    let primary_uri = sub.primary_uri().expect("ended submission has a hash").to_string();

    Submission::store_batch(&ctx.repo, vec![sub]).await?;

    Ok(Response::new(201).header("X-Location", primary_uri))
}

fn parse_common_params(query: &str) -> (Option<usize>, Option<crate::ids::SubmissionSequence>, bool) {
    let mut count = None;
    let mut after = None;
    let mut tail = false;
    for pair in query.split('&') {
        let Some((k, v)) = pair.split_once('=') else { continue };
        match k {
            "count" => count = v.parse::<usize>().ok(),
            "after" => after = query::parse_after(&super::request::percent_decode(v)).ok(),
            "tail" => tail = v == "1" || v.eq_ignore_ascii_case("true"),
            _ => {}
        }
    }
    (count, after, tail)
}

async fn handle_query_get(ctx: &Context, req: &ParsedRequest) -> SlnResult<Dispatched> {
    resolve_session(ctx, req).ok_or(SlnError::Eacces)?;
    let pairs = parse_form_urlencoded(req.query.as_bytes());
    let expr = pairs
        .iter()
        .find(|(k, _)| k == "q")
        .map(|(_, v)| v.as_str())
        .unwrap_or("*");
    let filter = filter::parser::parse(expr)?;
    let (count, after, tail) = parse_common_params(&req.query);
    stream_filter(ctx, filter, count, after, tail)
}

async fn handle_query_post(ctx: &Context, req: &ParsedRequest) -> SlnResult<Dispatched> {
    resolve_session(ctx, req).ok_or(SlnError::Eacces)?;
    let value: serde_json::Value =
        serde_json::from_slice(&req.body).map_err(|e| SlnError::Einval(format!("malformed JSON filter: {e}")))?;
    let filter = filter::json::build(&value)?;
    let (count, after, tail) = parse_common_params(&req.query);
    stream_filter(ctx, filter, count, after, tail)
}

fn handle_fixed_filter(ctx: &Context, req: &ParsedRequest, filter: Filter) -> SlnResult<Dispatched> {
    resolve_session(ctx, req).ok_or(SlnError::Eacces)?;
    let (count, after, tail) = parse_common_params(&req.query);
    stream_filter(ctx, filter, count, after, tail)
}

fn stream_filter(
    ctx: &Context,
    filter: Filter,
    count: Option<usize>,
    after: Option<crate::ids::SubmissionSequence>,
    tail: bool,
) -> SlnResult<Dispatched> {
    let mut streamer = QueryStreamer::new(ctx.repo.clone(), filter, true, after, tail);
    if let Some(count) = count {
        streamer = streamer.with_batch_size(count);
    }
    let head = Response::new(200).header("Content-Type", "text/uri-list");
    Ok(Dispatched::Chunked { head, streamer })
}
