use actix_web::{web, HttpRequest, HttpResponse};
use actix_ws::Message;

use super::AppState;
use crate::models::user::Actor;

/// WebSocket upgrade handler. The socket only carries server-to-client
/// alerts; client actions go through the HTTP API.
pub async fn ws_connect(
    req: HttpRequest,
    body: web::Payload,
    actor: Actor,
    state: web::Data<AppState>,
) -> Result<HttpResponse, actix_web::Error> {
    let (response, mut ws_session, mut msg_stream) = actix_ws::handle(&req, body)?;

    let live = state.dispatcher.live().clone();
    let mut rx = live.register(&actor.uid);
    let user_id = actor.uid;

    actix_web::rt::spawn(async move {
        loop {
            tokio::select! {
                Some(msg) = rx.recv() => {
                    if ws_session.text(msg).await.is_err() {
                        break;
                    }
                }
                Some(Ok(msg)) = msg_stream.recv() => {
                    match msg {
                        Message::Ping(bytes) => {
                            if ws_session.pong(&bytes).await.is_err() {
                                break;
                            }
                        }
                        Message::Close(_) => break,
                        _ => {}
                    }
                }
                else => break,
            }
        }

        drop(rx);
        live.prune(&user_id);
    });

    Ok(response)
}
