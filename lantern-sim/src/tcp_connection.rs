//! TCP slow-start model of a single connection.

use serde::{Deserialize, Serialize};

pub const INITIAL_CONGESTION_WINDOW: f64 = 10.0;
pub const TCP_SEGMENT_SIZE: f64 = 1460.0;

/// Where the time to first byte went on a cold connection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTiming {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_resolution_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection_time: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ssl_time: Option<f64>,
    pub time_to_first_byte: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownloadOptions {
    pub time_already_elapsed: f64,
    pub maximum_time_to_elapse: f64,
    pub dns_resolution_time: f64,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            time_already_elapsed: 0.0,
            maximum_time_to_elapse: f64::INFINITY,
            dns_resolution_time: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DownloadResults {
    pub round_trips: u32,
    pub time_elapsed: f64,
    pub bytes_downloaded: f64,
    pub extra_bytes_downloaded: f64,
    pub congestion_window: f64,
    pub connection_timing: ConnectionTiming,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TcpConnection {
    rtt: f64,
    throughput: f64,
    server_latency: f64,
    ssl: bool,
    h2: bool,
    warmed: bool,
    congestion_window: f64,
    h2_overflow_bytes_downloaded: f64,
}

impl TcpConnection {
    pub fn new(rtt: f64, throughput: f64, server_latency: f64, ssl: bool, h2: bool) -> Self {
        Self {
            rtt,
            throughput,
            server_latency,
            ssl,
            h2,
            warmed: false,
            congestion_window: INITIAL_CONGESTION_WINDOW,
            h2_overflow_bytes_downloaded: 0.0,
        }
    }

    /// How many connections can run at full speed before they start
    /// starving each other of bandwidth.
    pub fn maximum_saturated_connections(rtt: f64, available_throughput: f64) -> usize {
        let round_trips_per_second = 1000.0 / rtt;
        let bytes_per_second = round_trips_per_second * TCP_SEGMENT_SIZE;
        let minimum_throughput_per_request = bytes_per_second * 8.0;
        let connections = (available_throughput / minimum_throughput_per_request).floor();
        if connections.is_finite() {
            connections.max(0.0) as usize
        } else {
            usize::MAX
        }
    }

    fn maximum_congestion_window_in_segments(&self) -> f64 {
        let bytes_per_second = self.throughput / 8.0;
        let seconds_per_round_trip = self.rtt / 1000.0;
        let bytes_per_round_trip = bytes_per_second * seconds_per_round_trip;
        (bytes_per_round_trip / TCP_SEGMENT_SIZE).floor()
    }

    pub fn rtt(&self) -> f64 {
        self.rtt
    }

    pub fn throughput(&self) -> f64 {
        self.throughput
    }

    pub fn set_throughput(&mut self, throughput: f64) {
        self.throughput = throughput;
    }

    /// Throughput past which extra bandwidth no longer changes how the
    /// remaining `bytes` download. Slow start can at most double a window
    /// that is smaller than what is left, so twice that never caps it.
    pub fn throughput_demand(&self, bytes: f64) -> f64 {
        let segments = (bytes.max(0.0) / TCP_SEGMENT_SIZE)
            .ceil()
            .max(self.congestion_window)
            .max(1.0);
        (2.0 * segments + 0.5) * TCP_SEGMENT_SIZE * 8.0 * 1000.0 / self.rtt
    }

    pub fn congestion_window(&self) -> f64 {
        self.congestion_window
    }

    pub fn set_congestion_window(&mut self, congestion_window: f64) {
        self.congestion_window = congestion_window;
    }

    pub fn is_warm(&self) -> bool {
        self.warmed
    }

    pub fn set_warmed(&mut self, warmed: bool) {
        self.warmed = warmed;
    }

    pub fn is_h2(&self) -> bool {
        self.h2
    }

    pub fn set_h2(&mut self, h2: bool) {
        self.h2 = h2;
    }

    pub fn is_ssl(&self) -> bool {
        self.ssl
    }

    /// Bytes of the next response already received with the previous one.
    /// Only multiplexed (h2) connections carry these over.
    pub fn set_h2_overflow_bytes_downloaded(&mut self, bytes: f64) {
        if self.h2 {
            self.h2_overflow_bytes_downloaded = bytes;
        }
    }

    /// Simulates downloading `bytes_to_download` bytes, stopping early once
    /// `maximum_time_to_elapse` has passed.
    pub fn simulate_download_until(
        &self,
        bytes_to_download: f64,
        options: DownloadOptions,
    ) -> DownloadResults {
        let DownloadOptions {
            time_already_elapsed,
            maximum_time_to_elapse,
            dns_resolution_time,
        } = options;

        let mut bytes_to_download = bytes_to_download;
        if self.warmed && self.h2 {
            bytes_to_download -= self.h2_overflow_bytes_downloaded;
        }

        let two_way_latency = self.rtt;
        let one_way_latency = two_way_latency / 2.0;
        let maximum_congestion_window = self.maximum_congestion_window_in_segments();

        let handshake_and_request = if self.warmed {
            one_way_latency
        } else {
            // DNS, SYN, SYN-ACK, ACK + request, then TLS assuming False Start.
            dns_resolution_time
                + one_way_latency
                + one_way_latency
                + one_way_latency
                + if self.ssl { two_way_latency } else { 0.0 }
        };

        let mut round_trips = (handshake_and_request / two_way_latency).ceil() as u32;
        let mut time_to_first_byte = handshake_and_request + self.server_latency + one_way_latency;
        if self.warmed && self.h2 {
            time_to_first_byte = 0.0;
        }

        let time_elapsed_for_ttfb = (time_to_first_byte - time_already_elapsed).max(0.0);
        let maximum_download_time_to_elapse = maximum_time_to_elapse - time_elapsed_for_ttfb;

        let mut congestion_window = self.congestion_window.min(maximum_congestion_window);
        let mut total_bytes_downloaded = 0.0;
        if time_elapsed_for_ttfb > 0.0 {
            total_bytes_downloaded = congestion_window * TCP_SEGMENT_SIZE;
        } else {
            round_trips = 0;
        }

        let mut download_time_elapsed = 0.0;
        let mut bytes_remaining = bytes_to_download - total_bytes_downloaded;
        while bytes_remaining > 0.0 && download_time_elapsed <= maximum_download_time_to_elapse {
            round_trips += 1;
            download_time_elapsed += two_way_latency;
            congestion_window = (congestion_window * 2.0).min(maximum_congestion_window).max(1.0);

            let bytes_downloaded_in_window = congestion_window * TCP_SEGMENT_SIZE;
            total_bytes_downloaded += bytes_downloaded_in_window;
            bytes_remaining -= bytes_downloaded_in_window;
        }

        let time_elapsed = time_elapsed_for_ttfb + download_time_elapsed;
        let extra_bytes_downloaded = if self.h2 {
            (total_bytes_downloaded - bytes_to_download).max(0.0)
        } else {
            0.0
        };
        let bytes_downloaded = total_bytes_downloaded.min(bytes_to_download).max(0.0);

        let connection_timing = if self.warmed {
            ConnectionTiming {
                time_to_first_byte,
                ..Default::default()
            }
        } else {
            ConnectionTiming {
                dns_resolution_time: Some(dns_resolution_time),
                connection_time: Some(handshake_and_request - dns_resolution_time),
                ssl_time: self.ssl.then_some(two_way_latency),
                time_to_first_byte,
            }
        };

        DownloadResults {
            round_trips,
            time_elapsed,
            bytes_downloaded,
            extra_bytes_downloaded,
            congestion_window,
            connection_timing,
        }
    }
}
