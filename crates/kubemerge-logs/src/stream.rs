use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::{AsyncBufReadExt, FutureExt, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::Api;
use kube::api::LogParams;

use kubemerge_types::LogSince;

use crate::error::SourceError;
use crate::source::{LineStream, LogSource};

/// Log stream of one container in one pod
pub struct PodLogSource {
    api: Api<Pod>,
    pod_name: String,
    container: Option<String>,
}

impl PodLogSource {
    pub fn new(client: kube::Client, namespace: &str, pod_name: String, container: Option<String>) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
            pod_name,
            container,
        }
    }

    fn historical_params(container: Option<String>, since: Option<LogSince>) -> LogParams {
        let (since_seconds, since_time) = match since {
            // The API rejects sinceSeconds < 1
            Some(LogSince::Ago(ago)) => (Some((ago.as_secs() as i64).max(1)), None),
            Some(LogSince::Time(time)) => (None, Some(time)),
            None => (None, None),
        };

        LogParams {
            follow: false,
            container,
            timestamps: true,
            since_seconds,
            since_time,
            ..Default::default()
        }
    }

    fn live_params(container: Option<String>, from: DateTime<Utc>) -> LogParams {
        LogParams {
            follow: true,
            container,
            timestamps: true,
            since_time: Some(from),
            ..Default::default()
        }
    }

    fn open(&self, params: LogParams) -> BoxFuture<'_, Result<LineStream, SourceError>> {
        async move {
            let reader = self.api.log_stream(&self.pod_name, &params).await?;
            Ok(reader.lines().map_err(SourceError::from).boxed())
        }
        .boxed()
    }
}

impl LogSource for PodLogSource {
    fn id(&self) -> &str {
        &self.pod_name
    }

    fn open_historical(&self, since: Option<LogSince>) -> BoxFuture<'_, Result<LineStream, SourceError>> {
        self.open(Self::historical_params(self.container.clone(), since))
    }

    fn open_live(&self, from: DateTime<Utc>) -> BoxFuture<'_, Result<LineStream, SourceError>> {
        self.open(Self::live_params(self.container.clone(), from))
    }
}
