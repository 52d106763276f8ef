use super::{sound::LOCAL_SOUND_ROUTE, surface::OverlayHub};
use crate::{
    events::app_event::AppEvent,
    models::{emote::EmoteMap, message::ChatMessage},
};
use eyre::WrapErr;
use futures::stream;
use http_body_util::{BodyExt, Full, StreamBody, combinators::UnsyncBoxBody};
use hyper::{
    Method, Request, Response, StatusCode,
    body::{Bytes, Frame, Incoming},
    header,
    server::conn::http1,
    service::service_fn,
};
use hyper_util::rt::TokioIo;
use std::{collections::HashMap, convert::Infallible, net::SocketAddr, path::PathBuf, sync::Arc};
use tokio::{
    net::TcpListener,
    sync::{broadcast, mpsc},
};

const OVERLAY_PAGE: &str = include_str!("../../assets/overlay.html");
/// Team logos and other page images, served from the `img` directory.
const IMAGE_ROUTE: &str = "/img/";

type Body = UnsyncBoxBody<Bytes, Infallible>;

/// What every connection handler can reach.
pub struct ServerState {
    pub hub: OverlayHub,
    pub event_tx: mpsc::Sender<AppEvent>,
    pub sound_path: Option<PathBuf>,
}

/// Serves the overlay page, its event stream, the local sound and the debug hook.
pub async fn serve(bind: SocketAddr, state: Arc<ServerState>) -> Result<(), eyre::Report> {
    let listener = TcpListener::bind(bind)
        .await
        .wrap_err_with(|| format!("Could not bind the overlay server to {}", bind))?;
    tracing::info!("Overlay available at http://{}/", bind);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!("Failed to accept overlay connection: {}", e);
                continue;
            }
        };
        let state = state.clone();
        tokio::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { Ok::<_, Infallible>(route(req, &state).await) }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!("Overlay connection from {} ended: {}", peer, e);
            }
        });
    }
}

async fn route(req: Request<Incoming>, state: &ServerState) -> Response<Body> {
    tracing::debug!("{} {}", req.method(), req.uri());
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/") => html(OVERLAY_PAGE),
        (&Method::GET, "/events") => events(&state.hub),
        (&Method::GET, LOCAL_SOUND_ROUTE) => sound(state.sound_path.as_ref()).await,
        (&Method::GET, path) if path.starts_with(IMAGE_ROUTE) => image(path).await,
        (&Method::GET | &Method::POST, "/simulate") => {
            simulate(req.uri().query(), &state.event_tx).await
        }
        _ => text(StatusCode::NOT_FOUND, "not found"),
    }
}

fn full(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Body> {
    let mut response = Response::new(Full::new(body.into()).boxed_unsync());
    *response.status_mut() = status;
    if let Ok(value) = header::HeaderValue::from_str(content_type) {
        response.headers_mut().insert(header::CONTENT_TYPE, value);
    }
    response
}

fn html(page: &'static str) -> Response<Body> {
    full(StatusCode::OK, "text/html; charset=utf-8", page)
}

fn text(status: StatusCode, message: &'static str) -> Response<Body> {
    full(status, "text/plain; charset=utf-8", message)
}

fn sse_frame(json: &str) -> Result<Frame<Bytes>, Infallible> {
    Ok(Frame::data(Bytes::from(format!("data: {}\n\n", json))))
}

fn events(hub: &OverlayHub) -> Response<Body> {
    let (snapshot, rx) = hub.subscribe();
    tracing::info!("Overlay page attached ({} now)", hub.viewer_count());

    let initial = stream::iter(snapshot.into_iter().map(|json| sse_frame(&json)));
    let live = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(json) => return Some((sse_frame(&json), rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Overlay page fell behind, skipped {} updates", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    });

    let body = StreamBody::new(futures::StreamExt::chain(initial, live));
    let mut response = full(StatusCode::OK, "text/event-stream", Bytes::new());
    *response.body_mut() = BodyExt::boxed_unsync(body);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, header::HeaderValue::from_static("no-cache"));
    response
}

async fn sound(path: Option<&PathBuf>) -> Response<Body> {
    let Some(path) = path else {
        return text(StatusCode::NOT_FOUND, "no local sound configured");
    };
    match tokio::fs::read(path).await {
        Ok(bytes) => full(StatusCode::OK, audio_content_type(path), bytes),
        Err(e) => {
            tracing::error!("Failed to read sound file {:?}: {}", path, e);
            text(StatusCode::NOT_FOUND, "sound unavailable")
        }
    }
}

fn audio_content_type(path: &PathBuf) -> &'static str {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some("mp3") => "audio/mpeg",
        Some("ogg") => "audio/ogg",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// Maps `/img/a/b.png` to `img/a/b.png`, refusing anything that leaves the directory.
fn image_path(route: &str) -> Option<PathBuf> {
    let relative = route.strip_prefix(IMAGE_ROUTE)?;
    let mut path = PathBuf::from("img");
    for part in relative.split('/') {
        if part.is_empty() || part == "." || part == ".." || part.contains('\\') {
            return None;
        }
        path.push(part);
    }
    Some(path)
}

async fn image(route: &str) -> Response<Body> {
    let Some(path) = image_path(route) else {
        return text(StatusCode::NOT_FOUND, "not found");
    };
    let content_type = match path.extension().and_then(|ext| ext.to_str()) {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    };
    match tokio::fs::read(&path).await {
        Ok(bytes) => full(StatusCode::OK, content_type, bytes),
        Err(e) => {
            tracing::debug!("Image {:?} unavailable: {}", path, e);
            text(StatusCode::NOT_FOUND, "not found")
        }
    }
}

/// Reads `user` and `message` from a query string.
pub fn simulated_message(query: Option<&str>) -> Option<ChatMessage> {
    let params: HashMap<String, String> =
        form_urlencoded::parse(query.unwrap_or_default().as_bytes())
            .into_owned()
            .collect();
    let user = params.get("user").filter(|user| !user.trim().is_empty())?;
    let message = params.get("message")?;
    Some(ChatMessage::new(user.trim(), message.as_str(), Some(EmoteMap::new())))
}

async fn simulate(query: Option<&str>, event_tx: &mpsc::Sender<AppEvent>) -> Response<Body> {
    let Some(message) = simulated_message(query) else {
        return text(StatusCode::BAD_REQUEST, "expected ?user=..&message=..");
    };
    if event_tx.send(AppEvent::Simulate(message)).await.is_err() {
        tracing::error!("Failed to forward simulated message: presenter channel is closed.");
        return text(StatusCode::SERVICE_UNAVAILABLE, "presenter stopped");
    }
    text(StatusCode::ACCEPTED, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simulated_message() {
        let message = simulated_message(Some("user=Alice&message=hello+%3Cb%3Eworld%3C%2Fb%3E"))
            .expect("valid query");
        assert_eq!(message.sender_name, "Alice");
        assert_eq!(message.text, "hello <b>world</b>");
        assert_eq!(message.emotes, Some(EmoteMap::new()));
    }

    #[test]
    fn rejects_incomplete_queries() {
        assert!(simulated_message(None).is_none());
        assert!(simulated_message(Some("user=Alice")).is_none());
        assert!(simulated_message(Some("user=+&message=hi")).is_none());
    }

    #[tokio::test]
    async fn simulate_forwards_to_presenter() {
        let (tx, mut rx) = mpsc::channel(1);
        let response = simulate(Some("user=bob&message=gg"), &tx).await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let Some(AppEvent::Simulate(message)) = rx.recv().await else {
            panic!("expected a simulated message");
        };
        assert_eq!(message.sender_name, "bob");

        drop(rx);
        let response = simulate(Some("user=bob&message=gg"), &tx).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn image_paths_stay_inside_img() {
        assert_eq!(
            image_path("/img/teams/ferrari.png"),
            Some(PathBuf::from("img/teams/ferrari.png"))
        );
        assert_eq!(image_path("/img/../config/overlay.toml"), None);
        assert_eq!(image_path("/img/"), None);
    }

    #[test]
    fn picks_audio_content_types() {
        assert_eq!(audio_content_type(&PathBuf::from("a/ding.mp3")), "audio/mpeg");
        assert_eq!(audio_content_type(&PathBuf::from("ding")), "application/octet-stream");
    }
}
