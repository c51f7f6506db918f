//! Per-frame shaping pipeline used by every session.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;

use super::detector::Detector;
use super::owner::OwnerLookup;
use super::rewriter::PriorityRewriter;
use crate::config::ShapingConfig;
use crate::observability::metrics::{self, RequestStatus};
use crate::observability::Logger;
use crate::protocol::{join, segment, Frame};

const DETECT: &str = "detect";
const REWRITE: &str = "rewrite";

/// Stateless across frames; one instance is shared by all sessions.
pub struct FramePipeline {
    detector: Detector,
    rewriter: PriorityRewriter,
    owner: Option<Arc<OwnerLookup>>,
    log: Logger,
}

impl FramePipeline {
    pub fn new(config: &ShapingConfig, owner: Option<Arc<OwnerLookup>>, log: Logger) -> Self {
        Self {
            detector: Detector::new(&config.command_marker, &config.workflow_field, &config.priority_field),
            rewriter: PriorityRewriter::new(config.priority_offset, &config.priority_field),
            owner,
            log,
        }
    }

    /// Bytes to forward for one complete frame.
    pub fn process(&self, frame: Frame) -> Bytes {
        metrics::record_request(DETECT, RequestStatus::Started);

        let mut segments = segment(&frame);
        if !self.detector.is_targeted(&segments) {
            metrics::record_request(DETECT, RequestStatus::Skipped);
            return frame.into_bytes();
        }

        let start = Instant::now();
        let triple = self.detector.correlate(&segments);
        let found = triple.found_count();
        let Some(triple) = triple.into_complete() else {
            tracing::debug!(parent: self.log.span(), found, "Correlated payloads incomplete, forwarding unmodified");
            metrics::record_request(DETECT, RequestStatus::Skipped);
            return frame.into_bytes();
        };

        let rewritten = match self.rewriter.rewrite(&triple) {
            Ok(rewritten) => rewritten,
            Err(e) => {
                tracing::error!(parent: self.log.span(), error = %e, "Priority rewrite failed, forwarding unmodified");
                metrics::record_request(REWRITE, RequestStatus::Error);
                return frame.into_bytes();
            }
        };

        if let Some(owner) = &self.owner {
            owner.observe(&triple.data.workflow_id);
        }

        for seg in rewritten {
            if let Some(slot) = segments.get_mut(seg.index()) {
                *slot = seg;
            }
        }

        tracing::debug!(
            parent: self.log.span(),
            workflow_id = %triple.data.workflow_id,
            old_priority = triple.priority.value,
            new_priority = self.rewriter.next_priority(triple.priority.value),
            "Priority rewritten"
        );
        metrics::record_frame_duration(start);
        metrics::record_request(DETECT, RequestStatus::Completed);
        join(&segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheService, LocalCache};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::time::Duration;

    fn pipeline() -> FramePipeline {
        FramePipeline::new(&ShapingConfig::default(), None, Logger::none())
    }

    fn frame(raw: &'static [u8]) -> Frame {
        Frame::new(Bytes::from_static(raw)).unwrap()
    }

    const ADD_JOB: &[u8] = b"*7\r\n$4\r\nEVAL\r\n$6\r\nscript\r\n$27\r\n{\"workflowId\":\"wf_1\",\"a\":1}\r\n$27\r\n{\"priority\":5,\"attempts\":3}\r\n$1\r\n0\r\n$1\r\n5\r\n";

    #[test]
    fn non_targeted_frames_pass_through() {
        let raw: &[u8] = b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$16\r\n{\"priority\":5}\r\n\r\n";
        assert_eq!(&pipeline().process(frame(raw))[..], raw);
    }

    #[test]
    fn rewrites_priority_and_keeps_other_segments() {
        let out = pipeline().process(frame(ADD_JOB));
        let expected: &[u8] = b"*7\r\n$4\r\nEVAL\r\n$6\r\nscript\r\n$27\r\n{\"workflowId\":\"wf_1\",\"a\":1}\r\n$27\r\n{\"priority\":105,\"attempts\":3}\r\n$1\r\n0\r\n$1\r\n105\r\n";
        assert_eq!(&out[..], expected);
    }

    #[test]
    fn incomplete_triple_passes_through() {
        let raw: &[u8] = b"EVAL\r\n{\"workflowId\":\"w\"}\r\n{\"priority\":5}\r\n6\r\n";
        assert_eq!(&pipeline().process(frame(raw))[..], raw);
    }

    #[test]
    fn records_detect_outcomes() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let pipeline = pipeline();

        ::metrics::with_local_recorder(&recorder, || {
            pipeline.process(frame(b"PING\r\n"));
            pipeline.process(frame(ADD_JOB));
        });

        let rendered = handle.render();
        assert!(rendered.contains(r#"priority_proxy_requests_total{command="detect",status="started"} 2"#));
        assert!(rendered.contains(r#"priority_proxy_requests_total{command="detect",status="skipped"} 1"#));
        assert!(rendered.contains(r#"priority_proxy_requests_total{command="detect",status="completed"} 1"#));
    }

    #[tokio::test]
    async fn owner_lookup_does_not_change_output() {
        let cache = Arc::new(LocalCache::new(Duration::from_secs(60)));
        cache
            .set("n8n:cache:workflow-project:wf_1", r#"{"id":"p1","name":"Ada"}"#, None)
            .await
            .unwrap();
        let owner = Arc::new(OwnerLookup::new(cache, "n8n:cache:workflow-project", Logger::none()));
        let with_owner = FramePipeline::new(&ShapingConfig::default(), Some(owner), Logger::none());

        assert_eq!(with_owner.process(frame(ADD_JOB)), pipeline().process(frame(ADD_JOB)));
        tokio::task::yield_now().await;
    }
}
