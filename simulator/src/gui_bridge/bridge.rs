use crate::gui_bridge::model::DisplayModel;
use rdcore::interface::RangeDopplerFrame;
use rdcore::telemetry::MetricsSnapshot;
use serde_json::json;
use std::{
    net::SocketAddr,
    sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard},
    thread::{self, JoinHandle},
};
use tokio::runtime::Builder;
use warp::{http::StatusCode, Filter};

type SharedModel = Arc<RwLock<DisplayModel>>;

fn read(state: &SharedModel) -> RwLockReadGuard<'_, DisplayModel> {
    state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write(state: &SharedModel) -> RwLockWriteGuard<'_, DisplayModel> {
    state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// `GET /frame` returns the latest frame; `GET /status` returns bridge status.
fn routes(
    state: SharedModel,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let state_filter = warp::any().map(move || state.clone());

    let frame_route = warp::path("frame")
        .and(warp::path::end())
        .and(warp::get())
        .and(state_filter.clone())
        .map(|state: SharedModel| {
            let model = read(&state);
            match &model.frame {
                Some(frame) => warp::reply::with_status(warp::reply::json(frame), StatusCode::OK),
                None => warp::reply::with_status(
                    warp::reply::json(&json!({"status": "no frame published yet"})),
                    StatusCode::NOT_FOUND,
                ),
            }
        });

    let status_route = warp::path("status")
        .and(warp::path::end())
        .and(warp::get())
        .and(state_filter)
        .map(|state: SharedModel| {
            let model = read(&state);
            warp::reply::json(&model.status)
        });

    frame_route.or(status_route)
}

/// HTTP endpoint that hands the most recent frame to an external display.
pub struct GuiBridge {
    state: SharedModel,
}

impl GuiBridge {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(DisplayModel::default())),
        }
    }

    /// Serves the routes from a background thread with its own runtime.
    pub fn spawn_server(&self, address: SocketAddr) -> JoinHandle<()> {
        let routes = routes(self.state.clone());
        thread::spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    log::error!("display bridge runtime failed to start: {}", err);
                    return;
                }
            };
            log::info!("display bridge listening on http://{}", address);
            runtime.block_on(async move {
                warp::serve(routes).run(address).await;
            });
        })
    }

    pub fn publish(&self, frame: &RangeDopplerFrame) {
        let mut guard = write(&self.state);
        guard.replace_frame(frame);
        log::debug!(
            "[display] CPI {} ({} detections)",
            frame.info.sequence,
            frame.detections.len()
        );
    }

    pub fn publish_metrics(&self, metrics: MetricsSnapshot) {
        write(&self.state).status.metrics = Some(metrics);
    }

    pub fn publish_status(&self, message: &str) {
        write(&self.state).status.message = message.to_string();
        log::info!("[display] {}", message);
    }

    #[cfg(test)]
    pub fn status(&self) -> crate::gui_bridge::model::DisplayStatus {
        read(&self.state).status.clone()
    }
}

impl Default for GuiBridge {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rdcore::interface::{AxisSet, CpiInfo, RangeDopplerImage};

    fn frame(sequence: u64) -> RangeDopplerFrame {
        RangeDopplerFrame {
            info: CpiInfo {
                sequence,
                start_sample: sequence * 16,
            },
            image: RangeDopplerImage {
                db: Array2::from_elem((4, 2), -10.0),
                floor_db: -60.0,
                peak_magnitude: 1.0,
                degenerate: false,
            },
            axes: AxisSet {
                range_m: vec![0.0, 1.0, 2.0, 3.0],
                velocity_mps: vec![-1.0, 0.0],
            },
            detections: Vec::new(),
        }
    }

    #[test]
    fn newer_frame_replaces_unread_one() {
        let bridge = GuiBridge::new();
        bridge.publish(&frame(0));
        bridge.publish(&frame(1));
        let status = bridge.status();
        assert_eq!(status.frames_published, 2);
        assert_eq!(status.last_sequence, Some(1));
    }

    #[tokio::test]
    async fn frame_route_serves_latest_frame() {
        let bridge = GuiBridge::new();
        let filter = routes(bridge.state.clone());

        let empty = warp::test::request().path("/frame").reply(&filter).await;
        assert_eq!(empty.status(), StatusCode::NOT_FOUND);

        bridge.publish(&frame(7));
        bridge.publish_status("running");
        let reply = warp::test::request().path("/frame").reply(&filter).await;
        assert_eq!(reply.status(), StatusCode::OK);
        let body: serde_json::Value = serde_json::from_slice(reply.body()).unwrap();
        assert_eq!(body["info"]["sequence"], 7);
        assert_eq!(body["axes"]["velocity_mps"][0], -1.0);

        let status = warp::test::request().path("/status").reply(&filter).await;
        let body: serde_json::Value = serde_json::from_slice(status.body()).unwrap();
        assert_eq!(body["message"], "running");
        assert_eq!(body["frames_published"], 1);
    }
}
