//! Channelizer: select one narrow channel out of the wideband stream
//!
//! Each buffer is mixed down by an NCO at `-center_offset`, low-pass
//! filtered and decimated by an integer ratio, then handed to the downstream
//! sink at `input_rate / decimation`.
//!
//! Reconfiguration builds a complete [`ChannelPlan`] up front. A plan that
//! cannot be built is rejected and the active plan keeps running. A valid
//! plan is parked as pending and swapped in at the start of the next
//! buffer, so every buffer is processed entirely under one plan.

use log::{debug, info, warn};

use super::fir::DecimatingFir;
use super::nco::Nco;
use super::window;
use crate::error::{ConfigError, Result};
use crate::message::{Report, ReportQueue};
use crate::sink::{SampleSink, SinkConfig};
use crate::types::{IqSample, SampleBuffer};

/// Stopband attenuation of the channel filter
pub const STOPBAND_ATTENUATION_DB: f64 = 60.0;

/// Default channel bandwidth as a fraction of the output rate
const DEFAULT_BANDWIDTH_FRACTION: f64 = 0.8;

const MAX_TAPS: usize = 4095;

/// A validated channel configuration: ratio plus filter taps
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPlan {
    pub input_rate: u32,
    pub center_offset: i64,
    pub output_rate: u32,
    pub decimation: u32,
    pub bandwidth: Option<u32>,
    taps: Vec<f32>,
}

impl ChannelPlan {
    pub fn new(
        input_rate: u32,
        center_offset: i64,
        target_rate: u32,
        bandwidth: Option<u32>,
    ) -> std::result::Result<Self, ConfigError> {
        if input_rate == 0 {
            return Err(ConfigError::Invalid {
                name: "input rate",
                reason: "must be positive".to_string(),
            });
        }
        if target_rate == 0 || target_rate > input_rate || input_rate % target_rate != 0 {
            return Err(ConfigError::NonIntegerDecimation {
                input_rate,
                target_rate,
            });
        }
        let half_band = input_rate / 2;
        if center_offset.unsigned_abs() > u64::from(half_band) {
            return Err(ConfigError::OffsetOutOfBand {
                offset: center_offset,
                half_band,
            });
        }
        if let Some(bw) = bandwidth {
            if bw == 0 || bw > target_rate {
                return Err(ConfigError::InvalidBandwidth {
                    bandwidth: bw,
                    output_rate: target_rate,
                });
            }
        }

        let decimation = input_rate / target_rate;
        Ok(Self {
            input_rate,
            center_offset,
            output_rate: target_rate,
            decimation,
            bandwidth,
            taps: design_taps(input_rate, target_rate, decimation, bandwidth),
        })
    }

    pub fn taps(&self) -> &[f32] {
        &self.taps
    }

    /// No filtering: unity ratio at full bandwidth
    pub fn is_passthrough(&self) -> bool {
        self.taps.len() == 1
    }
}

/// Largest integer ratio that divides `input_rate` and keeps the rate at or above `target_rate`
fn fallback_decimation(input_rate: u32, target_rate: u32) -> u32 {
    let ceiling = (input_rate / target_rate.max(1)).max(1);
    (1..=ceiling).rev().find(|d| input_rate % d == 0).unwrap_or(1)
}

fn design_taps(input_rate: u32, output_rate: u32, decimation: u32, bandwidth: Option<u32>) -> Vec<f32> {
    if decimation == 1 && bandwidth.map_or(true, |bw| bw >= output_rate) {
        return vec![1.0];
    }

    let output_rate = f64::from(output_rate);
    let bw = bandwidth.map_or(output_rate * DEFAULT_BANDWIDTH_FRACTION, f64::from);
    let cutoff = bw / 2.0;
    // Transition centered on the cutoff, ending before the output Nyquist
    let transition = (output_rate / 2.0 - cutoff).min(cutoff).max(0.02 * output_rate);

    let input_rate = f64::from(input_rate);
    let num_taps = window::kaiser_length(STOPBAND_ATTENUATION_DB, transition / input_rate).min(MAX_TAPS);
    window::lowpass(num_taps, cutoff / input_rate, STOPBAND_ATTENUATION_DB)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ChannelRequest {
    center_offset: i64,
    target_rate: u32,
    bandwidth: Option<u32>,
}

struct ActiveChannel {
    plan: ChannelPlan,
    nco: Nco,
    fir: Option<DecimatingFir>,
    center_frequency: u64,
    produced: u64,
}

/// Frequency-translating decimator feeding a downstream sink
pub struct Channelizer<S> {
    name: String,
    downstream: S,
    request: ChannelRequest,
    input_rate: u32,
    center_frequency: u64,
    active: Option<ActiveChannel>,
    pending: Option<ChannelPlan>,
    reports: Option<ReportQueue>,
    mixed: Vec<IqSample>,
}

impl<S: SampleSink> Channelizer<S> {
    /// Channel at `center_offset` Hz from the device center, decimated to `target_rate`
    ///
    /// The plan is built once the input rate is known, from the first
    /// `StreamData` configuration or buffer.
    pub fn new(name: impl Into<String>, center_offset: i64, target_rate: u32, downstream: S) -> Self {
        Self {
            name: name.into(),
            downstream,
            request: ChannelRequest {
                center_offset,
                target_rate,
                bandwidth: None,
            },
            input_rate: 0,
            center_frequency: 0,
            active: None,
            pending: None,
            reports: None,
            mixed: Vec::new(),
        }
    }

    pub fn with_bandwidth(mut self, bandwidth: u32) -> Self {
        self.request.bandwidth = Some(bandwidth);
        self
    }

    /// Post a `ChannelConfigured` report whenever a plan is swapped in
    pub fn with_reports(mut self, reports: ReportQueue) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Plan the current buffers are processed with
    pub fn plan(&self) -> Option<&ChannelPlan> {
        self.active.as_ref().map(|a| &a.plan)
    }

    /// Plan waiting for the next buffer boundary
    pub fn pending_plan(&self) -> Option<&ChannelPlan> {
        self.pending.as_ref()
    }

    pub fn downstream(&self) -> &S {
        &self.downstream
    }

    pub fn downstream_mut(&mut self) -> &mut S {
        &mut self.downstream
    }

    fn request_plan(&mut self, request: ChannelRequest) -> Result<()> {
        if self.input_rate == 0 {
            if request.target_rate == 0 {
                return Err(ConfigError::NonIntegerDecimation {
                    input_rate: 0,
                    target_rate: 0,
                }
                .into());
            }
            self.request = request;
            return Ok(());
        }

        let plan = ChannelPlan::new(
            self.input_rate,
            request.center_offset,
            request.target_rate,
            request.bandwidth,
        )?;
        debug!(
            "{}: plan offset={}Hz rate={}Hz decimation={} taps={}",
            self.name,
            plan.center_offset,
            plan.output_rate,
            plan.decimation,
            plan.taps.len()
        );
        self.request = request;
        self.pending = Some(plan);
        Ok(())
    }

    fn on_stream_data(&mut self, sample_rate: u32, center_frequency: u64) -> Result<()> {
        self.input_rate = sample_rate;
        self.center_frequency = center_frequency;
        self.active = None;
        self.pending = None;

        let req = self.request;
        match ChannelPlan::new(sample_rate, req.center_offset, req.target_rate, req.bandwidth) {
            Ok(plan) => {
                self.pending = Some(plan);
                Ok(())
            }
            Err(ConfigError::NonIntegerDecimation { .. }) if sample_rate > 0 => {
                // Keep streaming at the lowest exactly reachable rate at or above the target
                let decimation = fallback_decimation(sample_rate, req.target_rate);
                let rate = sample_rate / decimation;
                let bandwidth = req.bandwidth.filter(|bw| *bw <= rate);
                warn!(
                    "{}: {}Hz is not reachable from {}Hz, using {}Hz",
                    self.name, req.target_rate, sample_rate, rate
                );
                let plan = ChannelPlan::new(sample_rate, req.center_offset, rate, bandwidth)?;
                self.pending = Some(plan);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn activate(&mut self, plan: ChannelPlan) -> Result<()> {
        let center_frequency = self.center_frequency.saturating_add_signed(plan.center_offset);
        let nco = Nco::new(-(plan.center_offset as f64), plan.input_rate);
        let fir = (!plan.is_passthrough()).then(|| DecimatingFir::new(plan.taps.clone(), plan.decimation as usize));

        info!(
            "{}: channel at {}Hz offset, {}Hz -> {}Hz",
            self.name, plan.center_offset, plan.input_rate, plan.output_rate
        );
        if let Some(reports) = &self.reports {
            reports.push(Report::ChannelConfigured {
                sink: self.name.clone(),
                center_offset: plan.center_offset,
                output_rate: plan.output_rate,
                decimation: plan.decimation,
            });
        }

        let output_rate = plan.output_rate;
        self.active = Some(ActiveChannel {
            plan,
            nco,
            fir,
            center_frequency,
            produced: 0,
        });
        self.downstream.configure(&SinkConfig::StreamData {
            sample_rate: output_rate,
            center_frequency,
        })
    }
}

impl<S: SampleSink> SampleSink for Channelizer<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn start(&mut self) {
        self.downstream.start();
    }

    fn stop(&mut self) {
        self.downstream.stop();
    }

    fn consume(&mut self, buffer: &SampleBuffer) -> Result<()> {
        if buffer.sample_rate != self.input_rate {
            self.on_stream_data(buffer.sample_rate, buffer.center_frequency)?;
        }
        if let Some(plan) = self.pending.take() {
            self.activate(plan)?;
        }

        let Self {
            active,
            mixed,
            downstream,
            ..
        } = self;
        let Some(active) = active.as_mut() else {
            return Ok(());
        };

        let input: &[IqSample] = if active.nco.is_identity() {
            buffer.samples()
        } else {
            mixed.clear();
            active.nco.mix(buffer.samples(), mixed);
            &mixed[..]
        };

        let out = match active.fir.as_mut() {
            Some(fir) => {
                let mut out = Vec::with_capacity(input.len() / fir.decimation() + 1);
                fir.process(input, &mut out);
                out
            }
            None => input.to_vec(),
        };
        if out.is_empty() {
            return Ok(());
        }

        let first_sample = active.produced;
        active.produced += out.len() as u64;
        let channel = SampleBuffer::new(out, active.plan.output_rate, active.center_frequency, first_sample);
        downstream.consume(&channel)
    }

    fn configure(&mut self, config: &SinkConfig) -> Result<()> {
        match config {
            SinkConfig::StreamData {
                sample_rate,
                center_frequency,
            } => self.on_stream_data(*sample_rate, *center_frequency),
            SinkConfig::Channel {
                center_offset,
                target_rate,
            } => self.request_plan(ChannelRequest {
                center_offset: *center_offset,
                target_rate: *target_rate,
                ..self.request
            }),
            SinkConfig::Bandwidth(bw) => self.request_plan(ChannelRequest {
                bandwidth: Some(*bw),
                ..self.request
            }),
            other => self.downstream.configure(other),
        }
    }
}
