use candle_nn::{AdamW, Optimizer};

use crate::{
    error::StylizeError,
    features::FeatureExtractor,
    frame::prepare_frame,
    frame_optimizer::{FrameKind, FrameOptimizer},
};
use flowstyle_image::Image;

/// Lifecycle of a [`SequenceOrchestrator`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequenceState {
    /// No frame was consumed yet.
    Empty,
    /// The first frame is being optimized. Only held while the first call
    /// to `push_frame` runs, every outcome leaves it.
    FirstFrame,
    /// At least one frame was emitted, later frames follow the motion.
    SteadyState,
    /// The sequence is over and accepts no more frames.
    Done,
}

/// Drives a [`FrameOptimizer`] over the frames of a sequence, strictly in order.
///
/// The first frame is optimized with the larger first frame budget and no
/// temporal term. Every later frame is warm started from the warped previous
/// result. A failure on any frame ends the sequence, since skipping a frame
/// would break the chain of previous results.
///
/// # Example
///
/// ```no_run
/// use flowstyle_image::Image;
/// use flowstyle_stylize::{FrameOptimizer, SequenceOrchestrator, StylizeConfig, VggExtractor};
///
/// let config = StylizeConfig::default();
/// let extractor = VggExtractor::vgg19(
///     "vgg19.safetensors",
///     config.content_layers.clone(),
///     config.style_layers.clone(),
/// )?;
/// let style = Image::<u8, 3>::from_size_val([256, 256].into(), 128)?;
/// let optimizer = FrameOptimizer::with_adam(extractor, &style, config)?;
///
/// let mut sequence = SequenceOrchestrator::new(optimizer);
/// let frames = vec![Image::<u8, 3>::from_size_val([320, 240].into(), 64)?; 3];
/// let count = sequence.run(frames.iter(), |index, stylized| {
///     println!("frame {index}: {}", stylized.size());
///     Ok(())
/// })?;
/// assert_eq!(count, 3);
/// # Ok::<(), flowstyle_stylize::StylizeError>(())
/// ```
pub struct SequenceOrchestrator<E, O: Optimizer = AdamW> {
    optimizer: FrameOptimizer<E, O>,
    state: SequenceState,
    frames_processed: usize,
}

impl<E: FeatureExtractor, O: Optimizer> SequenceOrchestrator<E, O> {
    /// Create an orchestrator in the [`SequenceState::Empty`] state.
    pub fn new(optimizer: FrameOptimizer<E, O>) -> Self {
        Self {
            optimizer,
            state: SequenceState::Empty,
            frames_processed: 0,
        }
    }

    /// The current state.
    pub fn state(&self) -> SequenceState {
        self.state
    }

    /// Number of stylized frames emitted so far.
    pub fn frames_processed(&self) -> usize {
        self.frames_processed
    }

    /// The frame optimizer, e.g. to inspect the last occlusion mask.
    pub fn optimizer(&self) -> &FrameOptimizer<E, O> {
        &self.optimizer
    }

    /// Stylize the next raw frame.
    ///
    /// The frame is prepared at the working resolution of the configuration.
    pub fn push_frame(&mut self, frame: &Image<u8, 3>) -> Result<Image<f32, 3>, StylizeError> {
        if self.state == SequenceState::Done {
            return Err(StylizeError::SequenceFinished);
        }

        let prepared = prepare_frame(frame, self.optimizer.config().max_image_size);
        match prepared {
            Ok(prepared) => self.push_prepared(&prepared),
            Err(e) => {
                self.enter(SequenceState::Done);
                Err(e)
            }
        }
    }

    /// Stylize the next frame, already prepared with values in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// * [`StylizeError::SequenceFinished`] once the sequence is done.
    /// * Any error of the frame optimizer, which also ends the sequence.
    pub fn push_prepared(&mut self, frame: &Image<f32, 3>) -> Result<Image<f32, 3>, StylizeError> {
        let kind = match self.state {
            SequenceState::Done => return Err(StylizeError::SequenceFinished),
            SequenceState::Empty | SequenceState::FirstFrame => {
                self.enter(SequenceState::FirstFrame);
                FrameKind::First
            }
            SequenceState::SteadyState => FrameKind::Subsequent,
        };

        match self.process(frame, kind) {
            Ok(stylized) => {
                log::info!(
                    "stylized frame {} ({}x{})",
                    self.frames_processed,
                    stylized.width(),
                    stylized.height()
                );
                self.frames_processed += 1;
                self.enter(SequenceState::SteadyState);
                Ok(stylized)
            }
            Err(e) => {
                log::warn!("aborting sequence at frame {}: {}", self.frames_processed, e);
                self.enter(SequenceState::Done);
                Err(e)
            }
        }
    }

    /// End the sequence. Later frames are rejected.
    pub fn finish(&mut self) {
        self.enter(SequenceState::Done);
    }

    /// Stylize every frame of `frames` in order, handing each result to
    /// `emit` before the next frame is read, then finish the sequence.
    ///
    /// Returns the number of frames emitted by this call.
    pub fn run<'a, I, F>(&mut self, frames: I, mut emit: F) -> Result<usize, StylizeError>
    where
        I: IntoIterator<Item = &'a Image<u8, 3>>,
        F: FnMut(usize, &Image<f32, 3>) -> Result<(), StylizeError>,
    {
        let mut count = 0;
        for frame in frames {
            let index = self.frames_processed;
            let stylized = self.push_frame(frame)?;
            if let Err(e) = emit(index, &stylized) {
                self.enter(SequenceState::Done);
                return Err(e);
            }
            count += 1;
        }

        self.finish();
        Ok(count)
    }

    fn enter(&mut self, state: SequenceState) {
        if self.state != state {
            log::debug!("sequence state {:?} -> {:?}", self.state, state);
            self.state = state;
        }
    }

    fn process(&mut self, frame: &Image<f32, 3>, kind: FrameKind) -> Result<Image<f32, 3>, StylizeError> {
        self.optimizer.set_frame(frame, kind)?;
        self.optimizer.optimize()
    }
}
