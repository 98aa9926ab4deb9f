//! Notification and closure dispatch for one connection
//!
//! Handlers hold a `Weak` back-reference so a transport never keeps its
//! session alive, and carry the connection epoch so callbacks from a
//! superseded transport are ignored.

use std::sync::{Arc, Weak};

use serde_json::Value;

use super::inbound;
use super::state::{ClosedKind, SessionCore};
use super::tasks::spawn_interrupt;
use crate::error::{BridgeError, Result};
use crate::normalize::{
    NotificationRoute, TurnStatus, implied_failure_status, observe_tool, route, thread_id,
    turn_id, turn_status,
};
use crate::transport::TransportHandlers;
use crate::types::events::TurnEvent;

impl SessionCore {
    /// Callbacks for a transport started under `epoch`
    pub(crate) fn transport_handlers(self: &Arc<Self>, epoch: u64) -> TransportHandlers {
        let weak: Weak<Self> = Arc::downgrade(self);

        let on_notification = {
            let weak = weak.clone();
            Arc::new(move |method: String, params: Value| {
                if let Some(core) = weak.upgrade() {
                    core.handle_notification(epoch, &method, params);
                }
            })
        };

        let on_inbound_request = {
            let weak = weak.clone();
            Arc::new(move |method: String, params: Value| {
                let weak = weak.clone();
                let fut: futures::future::BoxFuture<'static, Result<Value>> =
                    Box::pin(async move {
                        let Some(core) = weak.upgrade() else {
                            return Err(BridgeError::ConnectionClosed(None));
                        };
                        inbound::handle_request(&core, epoch, &method, params).await
                    });
                fut
            })
        };

        let on_closed = Arc::new(move |cause: Option<String>| {
            if let Some(core) = weak.upgrade() {
                core.handle_closed(epoch, cause);
            }
        });

        TransportHandlers {
            on_notification,
            on_inbound_request,
            on_closed,
        }
    }

    fn handle_notification(&self, epoch: u64, method: &str, params: Value) {
        let route = route(method);

        if route == Some(NotificationRoute::ThreadStarted)
            && let Some(id) = thread_id(&params)
        {
            log::debug!("agent reports thread {id}");
            self.set_thread_id(epoch, id);
        }

        let Some((run, transport)) = self.current_run(epoch) else {
            log::debug!("dropping `{method}`: no active run");
            return;
        };

        if let Some(notified) = turn_id(&params) {
            match run.turn_id() {
                Some(current) if current != notified => {
                    log::warn!(
                        "dropping `{method}` for turn {notified}; run {} is on turn {current}",
                        run.id()
                    );
                    return;
                }
                Some(_) => {}
                None if route == Some(NotificationRoute::TurnStarted) => {
                    if run.adopt_turn_id(&notified)
                        && let Some(transport) = transport
                    {
                        spawn_interrupt(
                            transport,
                            run.thread_id().to_string(),
                            notified,
                            self.options.request_timeout,
                        );
                    }
                }
                None => {}
            }
        }

        if self.options.surface_builtin_tools
            && let Some(route) = route
            && let Some(observation) = observe_tool(route, method, &params)
        {
            for event in self.track_tool(observation) {
                run.emit(event);
            }
            return;
        }

        let completion = route.and_then(|route| completion_status(route, method, &params));

        run.emit(TurnEvent::Notification {
            method: method.to_string(),
            params: params.clone(),
        });

        if let Some(status) = completion {
            run.complete(run.outcome_for(&status, &params));
        }
    }

    fn handle_closed(&self, epoch: u64, cause: Option<String>) {
        match self.on_transport_closed(epoch, cause.as_deref()) {
            ClosedKind::Stale => {
                log::debug!("ignoring closed signal from a superseded connection");
            }
            ClosedKind::Expected => {
                log::debug!("agent connection closed during shutdown");
            }
            ClosedKind::Fault { run, transport } => {
                match &cause {
                    Some(cause) => log::error!("agent connection lost: {cause}"),
                    None => log::error!("agent process closed the connection unexpectedly"),
                }
                if let Some(transport) = transport {
                    let grace = self.options.shutdown_timeout;
                    if let Ok(handle) = tokio::runtime::Handle::try_current() {
                        handle.spawn(async move {
                            if let Err(e) = transport.stop(grace).await {
                                log::debug!("reaping agent process failed: {e}");
                            }
                        });
                    }
                }
                if let Some(run) = run {
                    run.complete(Err(BridgeError::ConnectionClosed(cause)));
                }
            }
        }
    }
}

/// Terminal status announced by a notification, if any
fn completion_status(route: NotificationRoute, method: &str, params: &Value) -> Option<TurnStatus> {
    match route {
        NotificationRoute::TurnCompleted => {
            Some(turn_status(params).unwrap_or_else(|| TurnStatus::parse("completed")))
        }
        NotificationRoute::TurnFailed => Some(
            turn_status(params).unwrap_or_else(|| TurnStatus::parse(implied_failure_status(method))),
        ),
        NotificationRoute::TurnUpdated => turn_status(params).filter(TurnStatus::is_terminal),
        _ => None,
    }
}
