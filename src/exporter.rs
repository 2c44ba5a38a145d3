/*
 * This file is part of Tempsense Exporter.
 *
 * Copyright (C) 2025 Tempsense Exporter contributors
 *
 * Tempsense Exporter is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * Tempsense Exporter is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with Tempsense Exporter. If not, see <https://www.gnu.org/licenses/>.
 */

//! Prometheus registry bridge and the HTTP scrape endpoint.
//!
//! Each scrape of `/metrics` triggers one collection pass. The pass does
//! blocking device and file I/O, so the handler moves the gather onto the
//! blocking thread pool. A scrape always succeeds and reports whatever
//! subset of sensors was readable.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use prometheus::core::{Collector as PromCollector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};

use crate::collector::{Collector, Sample};

/// Adapts the core collector to the Prometheus registry: every registry
/// gather resets the gauge family and refills it from one collection pass,
/// so departed sensors do not linger as stale series.
pub struct PrometheusBridge {
    collector: Arc<Collector>,
    gauge: GaugeVec,
}

impl PrometheusBridge {
    pub fn new(collector: Arc<Collector>) -> Result<Self, prometheus::Error> {
        let desc = collector.describe();
        let gauge = GaugeVec::new(Opts::new(desc.name, desc.help), &desc.labels)?;
        Ok(PrometheusBridge { collector, gauge })
    }
}

impl PromCollector for PrometheusBridge {
    fn desc(&self) -> Vec<&Desc> {
        self.gauge.desc()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.gauge.reset();
        let gauge = &self.gauge;
        // The gauge sink always accepts; backpressure handling lives in
        // ChannelSink for consumers that need a bounded channel.
        let mut sink = |sample: Sample| {
            gauge
                .with_label_values(&[
                    sample.display_name.as_str(),
                    sample.id.as_str(),
                    sample.sensor_nr.as_str(),
                    sample.sensor_type.as_str(),
                ])
                .set(sample.temperature_c);
            true
        };
        self.collector.collect(&mut sink);
        self.gauge.collect()
    }
}

pub fn build_registry(collector: Arc<Collector>) -> Result<Registry, prometheus::Error> {
    let registry = Registry::new();
    registry.register(Box::new(PrometheusBridge::new(collector)?))?;
    Ok(registry)
}

pub fn router(registry: Registry) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics))
        .with_state(registry)
}

pub async fn serve(addr: SocketAddr, registry: Registry) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    eprintln!("tempsense: serving metrics on http://{}/metrics", addr);
    axum::serve(listener, router(registry)).await?;
    Ok(())
}

async fn index() -> impl IntoResponse {
    Html(
        "<html><head><title>Tempsense Exporter</title></head>\
         <body><h1>Tempsense Exporter</h1>\
         <p><a href=\"/metrics\">/metrics</a></p></body></html>",
    )
}

async fn metrics(State(registry): State<Registry>) -> impl IntoResponse {
    let result = tokio::task::spawn_blocking(move || encode_metrics(&registry)).await;
    match result {
        Ok(Ok(body)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Ok(Err(e)) => {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("encode error: {}", e)).into_response()
        }
        Err(e) => {
            (StatusCode::INTERNAL_SERVER_ERROR, format!("collection panicked: {}", e))
                .into_response()
        }
    }
}

fn encode_metrics(registry: &Registry) -> Result<Vec<u8>, prometheus::Error> {
    let families = registry.gather();
    let mut buf = Vec::new();
    TextEncoder::new().encode(&families, &mut buf)?;
    Ok(buf)
}
