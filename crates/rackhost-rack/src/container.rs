//! The rack as seen by an audio callback.
//!
//! [`ProcessorContainer`] owns a [`RackProcessor`] plus the channel routing
//! from device input to rack channels. The routing is computed on the control
//! thread before the stream starts; the callback only copies samples.

use crate::controller::RackController;
use crate::instance::InstanceId;
use crate::processor::RackProcessor;
use rackhost_core::{AudioBlock, EventBuffer, MidiEvent, PlaybackSettings, SetupError};

/// Events a container can queue for one block.
pub const EVENT_CAPACITY: usize = 256;

/// One input channel copied to one output channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    /// Device input channel.
    pub input: usize,
    /// Rack / device output channel.
    pub output: usize,
}

/// Input → output channel routing for duplex processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLayout {
    input_channels: usize,
    output_channels: usize,
    routes: Vec<Route>,
}

impl ChannelLayout {
    /// Identity routing; a mono input feeds every output.
    pub fn new(input_channels: usize, output_channels: usize) -> Self {
        let routes = if input_channels == 1 {
            (0..output_channels)
                .map(|output| Route { input: 0, output })
                .collect()
        } else {
            (0..input_channels.min(output_channels))
                .map(|ch| Route {
                    input: ch,
                    output: ch,
                })
                .collect()
        };
        Self {
            input_channels,
            output_channels: output_channels.max(1),
            routes,
        }
    }

    /// Routes the n-th enabled input channel to the n-th enabled output
    /// channel. Bit `i` of a mask enables channel `i`.
    pub fn from_masks(
        input_channels: usize,
        output_channels: usize,
        input_mask: u64,
        output_mask: u64,
    ) -> Self {
        let enabled = |channels: usize, mask: u64| {
            (0..channels.min(64)).filter(move |&ch| mask & (1 << ch) != 0)
        };
        let routes = enabled(input_channels, input_mask)
            .zip(enabled(output_channels, output_mask))
            .map(|(input, output)| Route { input, output })
            .collect();
        Self {
            input_channels,
            output_channels: output_channels.max(1),
            routes,
        }
    }

    /// Output only; nothing is read from the input.
    pub fn output_only(output_channels: usize) -> Self {
        Self {
            input_channels: 0,
            output_channels: output_channels.max(1),
            routes: Vec::new(),
        }
    }

    /// Interleaved input channel count.
    pub fn input_channels(&self) -> usize {
        self.input_channels
    }

    /// Interleaved output channel count.
    pub fn output_channels(&self) -> usize {
        self.output_channels
    }

    /// The channel routes.
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

/// A [`RackProcessor`] wired to device buffers.
#[derive(Debug)]
pub struct ProcessorContainer {
    processor: RackProcessor,
    layout: ChannelLayout,
    events: EventBuffer,
}

impl ProcessorContainer {
    /// Wraps a processor with a routing layout.
    pub fn new(processor: RackProcessor, layout: ChannelLayout) -> Self {
        Self {
            processor,
            layout,
            events: EventBuffer::with_capacity(EVENT_CAPACITY),
        }
    }

    /// Current routing.
    pub fn layout(&self) -> &ChannelLayout {
        &self.layout
    }

    /// Replaces the routing. Control thread, stream stopped.
    pub fn set_layout(&mut self, layout: ChannelLayout) {
        self.layout = layout;
    }

    /// Queues an event for the next duplex block. Returns `false` when full.
    pub fn push_event(&mut self, event: MidiEvent) -> bool {
        self.events.push(event)
    }

    /// Routes `input` into `output` and runs the rack over it in place.
    ///
    /// Both buffers are interleaved with the layout's channel counts. Output
    /// channels without a route start silent.
    pub fn process_duplex(&mut self, input: &[f32], output: &mut [f32]) {
        let in_ch = self.layout.input_channels;
        let out_ch = self.layout.output_channels;
        output.fill(0.0);
        if in_ch > 0 {
            for (frame_in, frame_out) in input
                .chunks_exact(in_ch)
                .zip(output.chunks_exact_mut(out_ch))
            {
                for route in &self.layout.routes {
                    if let (Some(&s), Some(d)) =
                        (frame_in.get(route.input), frame_out.get_mut(route.output))
                    {
                        *d = s;
                    }
                }
            }
        }
        let mut block = AudioBlock::new(output, out_ch);
        self.processor.process_f32(&mut block, None, &self.events);
        self.events.clear();
    }

    /// Runs the rack over a single-precision block in place.
    pub fn process_f32(
        &mut self,
        block: &mut AudioBlock<'_, f32>,
        sidechain: Option<&[f32]>,
        events: &EventBuffer,
    ) {
        self.processor.process_f32(block, sidechain, events);
    }

    /// Runs the rack over a double-precision block in place.
    pub fn process_f64(
        &mut self,
        block: &mut AudioBlock<'_, f64>,
        sidechain: Option<&[f64]>,
        events: &EventBuffer,
    ) {
        self.processor.process_f64(block, sidechain, events);
    }

    /// Re-prepares the rack for new stream settings. Stream stopped.
    ///
    /// Returns the instances left parked.
    pub fn prepare(
        &mut self,
        controller: &mut RackController,
        settings: PlaybackSettings,
    ) -> Vec<(InstanceId, SetupError)> {
        controller.reconfigure(&mut self.processor, settings)
    }

    /// Ends playback on every instance. Stream stopped.
    pub fn release(&mut self) {
        self.processor.release();
    }

    /// Sum of the active chain's latency.
    pub fn latency_samples(&self) -> usize {
        self.processor.latency_samples()
    }

    /// The wrapped processor.
    pub fn processor(&self) -> &RackProcessor {
        &self.processor
    }

    /// The wrapped processor, mutably.
    pub fn processor_mut(&mut self) -> &mut RackProcessor {
        &mut self.processor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_routes() {
        let layout = ChannelLayout::new(2, 2);
        assert_eq!(
            layout.routes(),
            &[
                Route {
                    input: 0,
                    output: 0
                },
                Route {
                    input: 1,
                    output: 1
                }
            ]
        );
    }

    #[test]
    fn mono_input_spreads() {
        let layout = ChannelLayout::new(1, 2);
        assert_eq!(layout.routes().len(), 2);
        assert!(layout.routes().iter().all(|r| r.input == 0));
    }

    #[test]
    fn masks_pair_enabled_channels() {
        let layout = ChannelLayout::from_masks(4, 4, 0b1100, 0b0011);
        assert_eq!(
            layout.routes(),
            &[
                Route {
                    input: 2,
                    output: 0
                },
                Route {
                    input: 3,
                    output: 1
                }
            ]
        );
    }
}
