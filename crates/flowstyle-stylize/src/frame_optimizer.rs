use candle_core::{DType, Tensor, Var};
use candle_nn::{AdamW, Optimizer, ParamsAdamW};

use crate::{
    config::StylizeConfig,
    error::StylizeError,
    features::FeatureExtractor,
    frame::{grey_frame, image_to_tensor, prepare_frame, tensor_to_image},
    losses::{layer_loss, temporal_loss, LossBreakdown},
};
use flowstyle_flow::{
    detect_occlusions, warp, Farneback, FlowEstimator, FlowPair, OcclusionMask,
};
use flowstyle_image::{Image, ImageSize};

/// Position of a frame in its sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// The frame starts the sequence and has no predecessor.
    First,
    /// The frame follows the last optimized frame.
    Subsequent,
}

// The warped previous result and the mask applied to it.
struct TemporalTarget {
    warped: Image<f32, 3>,
    warped_tensor: Tensor,
    mask: OcclusionMask,
    weights: Tensor,
}

struct PreviousFrame {
    stylized: Image<f32, 3>,
    grey: Image<f32, 1>,
}

struct CurrentFrame {
    grey: Image<f32, 1>,
    kind: FrameKind,
}

/// Stylizes one frame at a time by gradient descent on the frame itself.
///
/// The optimized image is a single [`Var`] created with the first frame and
/// reset in place for every later frame, so the optimizer state carries over
/// from frame to frame. All frames of a run must share their size.
pub struct FrameOptimizer<E, O: Optimizer = AdamW> {
    config: StylizeConfig,
    extractor: E,
    flow: Box<dyn FlowEstimator>,
    style_targets: Vec<Tensor>,
    content_targets: Vec<Tensor>,
    image: Option<Var>,
    optimizer: Option<O>,
    optimizer_config: Option<O::Config>,
    size: Option<ImageSize>,
    temporal: Option<TemporalTarget>,
    previous: Option<PreviousFrame>,
    current: Option<CurrentFrame>,
}

impl<E: FeatureExtractor> FrameOptimizer<E, AdamW> {
    /// Create an optimizer using Adam with the parameters of `config.optimizer`.
    pub fn with_adam(
        extractor: E,
        style: &Image<u8, 3>,
        config: StylizeConfig,
    ) -> Result<Self, StylizeError> {
        let params = ParamsAdamW::from(&config.optimizer);
        Self::new(extractor, style, config, params)
    }
}

impl<E: FeatureExtractor, O: Optimizer> FrameOptimizer<E, O> {
    /// Create an optimizer estimating motion with [`Farneback`].
    ///
    /// The style image is prepared at the working resolution and its style
    /// features become the target of the whole run.
    ///
    /// # Arguments
    ///
    /// * `extractor` - The network providing content and style features.
    /// * `style` - The style image.
    /// * `config` - The run configuration.
    /// * `optimizer_config` - Hyper parameters of the gradient update.
    pub fn new(
        extractor: E,
        style: &Image<u8, 3>,
        config: StylizeConfig,
        optimizer_config: O::Config,
    ) -> Result<Self, StylizeError> {
        let flow = Farneback::new(config.flow.clone())?;
        Self::with_flow_estimator(extractor, Box::new(flow), style, config, optimizer_config)
    }

    /// Create an optimizer with a custom motion estimator.
    pub fn with_flow_estimator(
        extractor: E,
        flow: Box<dyn FlowEstimator>,
        style: &Image<u8, 3>,
        config: StylizeConfig,
        optimizer_config: O::Config,
    ) -> Result<Self, StylizeError> {
        config.validate()?;

        let style = prepare_frame(style, config.max_image_size)?;
        let style = image_to_tensor(&style, extractor.device())?;
        let style_targets = extractor.extract(&style)?.style;

        Ok(Self {
            config,
            extractor,
            flow,
            style_targets,
            content_targets: Vec::new(),
            image: None,
            optimizer: None,
            optimizer_config: Some(optimizer_config),
            size: None,
            temporal: None,
            previous: None,
            current: None,
        })
    }

    /// The configuration of the run.
    pub fn config(&self) -> &StylizeConfig {
        &self.config
    }

    /// The feature extractor.
    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Size of the frames of the run, known once the first frame is set.
    pub fn frame_size(&self) -> Option<ImageSize> {
        self.size
    }

    /// Set the frame to optimize next.
    ///
    /// The content target is extracted from `frame`. A [`FrameKind::First`]
    /// frame starts the optimization from the frame itself. A
    /// [`FrameKind::Subsequent`] frame estimates the motion from the previous
    /// frame, warps the previous result onto the current frame, detects the
    /// occluded pixels and starts from the warped result.
    ///
    /// # Arguments
    ///
    /// * `frame` - The prepared frame with values in `[0, 1]`.
    /// * `kind` - Whether the frame starts the sequence.
    ///
    /// # Errors
    ///
    /// * [`StylizeError::InputMismatch`] if the frame size differs from the run.
    /// * [`StylizeError::NotInitialized`] for a subsequent frame when no frame
    ///   was optimized yet.
    pub fn set_frame(&mut self, frame: &Image<f32, 3>, kind: FrameKind) -> Result<(), StylizeError> {
        if let Some(size) = self.size {
            if frame.size() != size {
                return Err(StylizeError::InputMismatch(size, frame.size()));
            }
        }

        let device = self.extractor.device().clone();
        let grey = grey_frame(frame)?;
        let tensor = image_to_tensor(frame, &device)?.contiguous()?;
        let content_targets = self.extractor.extract(&tensor)?.content;

        let (init, temporal) = match kind {
            FrameKind::First => (tensor, None),
            FrameKind::Subsequent => {
                let previous = self.previous.as_ref().ok_or(StylizeError::NotInitialized)?;

                let pair = FlowPair::estimate(self.flow.as_ref(), &previous.grey, &grey)?;
                let warped = warp(&previous.stylized, &pair.backward)?;
                let mask = detect_occlusions(&pair.backward, &pair.forward, &self.config.occlusion)?;

                log::debug!(
                    "{} of {} pixels occluded",
                    mask.num_occluded(),
                    mask.size().area()
                );

                let warped_tensor = image_to_tensor(&warped, &device)?.contiguous()?;
                let weights = image_to_tensor(&mask.weights()?, &device)?.contiguous()?;

                let temporal = TemporalTarget {
                    warped,
                    warped_tensor: warped_tensor.clone(),
                    mask,
                    weights,
                };
                (warped_tensor, Some(temporal))
            }
        };

        match &self.image {
            Some(image) => image.set(&init)?,
            None => {
                let image = Var::from_tensor(&init)?;
                if let Some(optimizer_config) = self.optimizer_config.take() {
                    self.optimizer = Some(O::new(vec![image.clone()], optimizer_config)?);
                }
                self.image = Some(image);
            }
        }

        self.size = Some(frame.size());
        self.content_targets = content_targets;
        self.temporal = temporal;
        self.current = Some(CurrentFrame { grey, kind });

        Ok(())
    }

    /// Run one gradient step followed by clipping the image to `[0, 1]`.
    ///
    /// Returns the loss evaluated before the update.
    ///
    /// # Errors
    ///
    /// [`StylizeError::NumericalDegeneracy`] if the loss or its gradient is not
    /// finite. The image is left untouched in that case.
    pub fn step(&mut self) -> Result<LossBreakdown, StylizeError> {
        let image = self.image.clone().ok_or(StylizeError::NotInitialized)?;

        let (loss, breakdown) = self.compose_loss(image.as_tensor())?;
        if !breakdown.total.is_finite() {
            return Err(StylizeError::NumericalDegeneracy("loss"));
        }

        let grads = loss.backward()?;
        if let Some(grad) = grads.get(image.as_tensor()) {
            // g - g is exactly zero for finite g and NaN otherwise
            let residual = grad.sub(grad)?.sum_all()?.to_scalar::<f32>()?;
            if residual != 0.0 {
                return Err(StylizeError::NumericalDegeneracy("gradient"));
            }
        }

        let optimizer = self.optimizer.as_mut().ok_or(StylizeError::NotInitialized)?;
        optimizer.step(&grads)?;

        image.set(&image.as_tensor().clamp(0f32, 1f32)?)?;

        Ok(breakdown)
    }

    /// Run the full step budget of the current frame and return the result.
    ///
    /// The result and the greyscale frame become the previous frame of the
    /// next [`FrameKind::Subsequent`] frame.
    pub fn optimize(&mut self) -> Result<Image<f32, 3>, StylizeError> {
        let (kind, grey) = match &self.current {
            Some(current) => (current.kind, current.grey.clone()),
            None => return Err(StylizeError::NotInitialized),
        };

        let epochs = self.config.epochs_for(kind == FrameKind::First);

        for epoch in 0..epochs {
            let mut last = LossBreakdown::default();
            for _ in 0..self.config.steps_per_epoch {
                last = self.step()?;
            }
            log::debug!("epoch {}/{}: {}", epoch + 1, epochs, last);
        }

        let stylized = self.current_frame()?;
        self.previous = Some(PreviousFrame {
            stylized: stylized.clone(),
            grey,
        });

        Ok(stylized)
    }

    /// The weighted loss terms of the current image.
    pub fn loss_breakdown(&self) -> Result<LossBreakdown, StylizeError> {
        let image = self.image.as_ref().ok_or(StylizeError::NotInitialized)?;
        let (_, breakdown) = self.compose_loss(image.as_tensor())?;
        Ok(breakdown)
    }

    /// The unweighted temporal loss of the current image, zero for a first frame.
    pub fn temporal_loss(&self) -> Result<f32, StylizeError> {
        let image = self.image.as_ref().ok_or(StylizeError::NotInitialized)?;
        Ok(self.temporal_term(image.as_tensor())?.to_scalar::<f32>()?)
    }

    /// A copy of the image being optimized.
    pub fn current_frame(&self) -> Result<Image<f32, 3>, StylizeError> {
        let image = self.image.as_ref().ok_or(StylizeError::NotInitialized)?;
        tensor_to_image(image.as_tensor())
    }

    /// The occlusion mask of the current transition, `None` for a first frame.
    pub fn occlusion_mask(&self) -> Option<&OcclusionMask> {
        self.temporal.as_ref().map(|t| &t.mask)
    }

    /// The previous result warped onto the current frame, `None` for a first
    /// frame.
    pub fn warped_previous(&self) -> Option<&Image<f32, 3>> {
        self.temporal.as_ref().map(|t| &t.warped)
    }

    fn temporal_term(&self, image: &Tensor) -> Result<Tensor, StylizeError> {
        match &self.temporal {
            Some(t) => temporal_loss(image, &t.warped_tensor, &t.weights),
            None => Ok(Tensor::zeros((), DType::F32, image.device())?),
        }
    }

    fn compose_loss(&self, image: &Tensor) -> Result<(Tensor, LossBreakdown), StylizeError> {
        let device = image.device();
        let features = self.extractor.extract(image)?;

        let content = layer_loss(&features.content, &self.content_targets, device)?
            .affine(self.config.content_weight as f64, 0.0)?;
        let style = layer_loss(&features.style, &self.style_targets, device)?
            .affine(self.config.style_weight as f64, 0.0)?;
        let temporal = self
            .temporal_term(image)?
            .affine(self.config.temporal_weight as f64, 0.0)?;

        let total = content.add(&style)?.add(&temporal)?;

        let breakdown = LossBreakdown {
            content: content.to_scalar::<f32>()?,
            style: style.to_scalar::<f32>()?,
            temporal: temporal.to_scalar::<f32>()?,
            total: total.to_scalar::<f32>()?,
        };

        Ok((total, breakdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{gram_matrix, Features};
    use crate::vgg::tests::tiny_extractor;
    use crate::vgg::VggExtractor;

    fn test_config() -> StylizeConfig {
        StylizeConfig {
            epochs: 1,
            steps_per_epoch: 2,
            first_frame_epochs: 2,
            content_layers: vec!["block2_conv2".to_string()],
            style_layers: vec!["block1_conv1".to_string(), "block2_conv1".to_string()],
            max_image_size: None,
            ..Default::default()
        }
    }

    fn style_image() -> Result<Image<u8, 3>, StylizeError> {
        Ok(Image::from_fn([12, 12].into(), |x, y| {
            [(x * 20) as u8, (y * 20) as u8, ((x + y) * 10) as u8]
        })?)
    }

    fn frame() -> Result<Image<f32, 3>, StylizeError> {
        Ok(Image::from_fn([16, 12].into(), |x, y| {
            let v = ((x as f32 * 0.4).sin() * (y as f32 * 0.3).cos() + 1.0) * 0.5;
            [v, 1.0 - v, 0.5]
        })?)
    }

    fn optimizer(config: StylizeConfig) -> Result<FrameOptimizer<VggExtractor>, StylizeError> {
        FrameOptimizer::with_adam(tiny_extractor()?, &style_image()?, config)
    }

    #[test]
    fn first_frame_has_no_temporal_loss() -> Result<(), StylizeError> {
        let mut opt = optimizer(test_config())?;
        opt.set_frame(&frame()?, FrameKind::First)?;

        assert_eq!(opt.temporal_loss()?, 0.0);
        assert!(opt.occlusion_mask().is_none());
        assert!(opt.warped_previous().is_none());

        opt.optimize()?;
        assert_eq!(opt.temporal_loss()?, 0.0);
        assert_eq!(opt.loss_breakdown()?.temporal, 0.0);
        Ok(())
    }

    #[test]
    fn first_frame_starts_from_the_frame() -> Result<(), StylizeError> {
        let mut opt = optimizer(test_config())?;
        let frame = frame()?;
        opt.set_frame(&frame, FrameKind::First)?;

        let current = opt.current_frame()?;
        for (a, b) in current.as_slice().iter().zip(frame.as_slice()) {
            approx::assert_relative_eq!(a, b, epsilon = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn values_stay_clipped() -> Result<(), StylizeError> {
        let config = StylizeConfig {
            optimizer: crate::AdamConfig {
                learning_rate: 0.5,
                ..Default::default()
            },
            ..test_config()
        };
        let mut opt = optimizer(config)?;
        opt.set_frame(&frame()?, FrameKind::First)?;

        for _ in 0..4 {
            opt.step()?;
            let current = opt.current_frame()?;
            assert!(current.as_slice().iter().all(|v| (0.0..=1.0).contains(v)));
        }
        Ok(())
    }

    #[test]
    fn style_weight_scales_only_the_style_term() -> Result<(), StylizeError> {
        let frame = frame()?;

        let mut base = optimizer(test_config())?;
        base.set_frame(&frame, FrameKind::First)?;
        let a = base.loss_breakdown()?;

        let mut scaled = optimizer(StylizeConfig {
            style_weight: 30.0,
            ..test_config()
        })?;
        scaled.set_frame(&frame, FrameKind::First)?;
        let b = scaled.loss_breakdown()?;

        approx::assert_relative_eq!(b.style, 3.0 * a.style, max_relative = 1e-5);
        assert_eq!(b.content, a.content);
        assert_eq!(b.temporal, a.temporal);
        approx::assert_relative_eq!(b.total - a.total, b.style - a.style, max_relative = 1e-4);
        Ok(())
    }

    #[test]
    fn step_reports_finite_losses() -> Result<(), StylizeError> {
        let mut opt = optimizer(test_config())?;
        opt.set_frame(&frame()?, FrameKind::First)?;

        let breakdown = opt.step()?;

        assert!(breakdown.total.is_finite());
        assert!(breakdown.style > 0.0);
        approx::assert_relative_eq!(
            breakdown.total,
            breakdown.content + breakdown.style + breakdown.temporal,
            max_relative = 1e-5
        );
        Ok(())
    }

    // Content features poisoned with NaN.
    struct NanExtractor(candle_core::Device);

    impl FeatureExtractor for NanExtractor {
        fn device(&self) -> &candle_core::Device {
            &self.0
        }

        fn extract(&self, image: &Tensor) -> Result<Features, StylizeError> {
            Ok(Features {
                content: vec![image.affine(f64::NAN, 0.0)?],
                style: vec![gram_matrix(image)?],
            })
        }
    }

    #[test]
    fn non_finite_loss_is_degenerate() -> Result<(), StylizeError> {
        let extractor = NanExtractor(candle_core::Device::Cpu);
        let mut opt = FrameOptimizer::with_adam(extractor, &style_image()?, test_config())?;
        let frame = frame()?;
        opt.set_frame(&frame, FrameKind::First)?;

        assert!(matches!(
            opt.step(),
            Err(StylizeError::NumericalDegeneracy("loss"))
        ));

        // the image is left untouched
        assert_eq!(opt.current_frame()?, frame);
        Ok(())
    }

    // Square root of the pixels as content, its gradient is not finite at zero.
    struct SqrtExtractor(candle_core::Device);

    impl FeatureExtractor for SqrtExtractor {
        fn device(&self) -> &candle_core::Device {
            &self.0
        }

        fn extract(&self, image: &Tensor) -> Result<Features, StylizeError> {
            Ok(Features {
                content: vec![image.sqrt()?],
                style: vec![],
            })
        }
    }

    #[test]
    fn non_finite_gradient_is_degenerate() -> Result<(), StylizeError> {
        let extractor = SqrtExtractor(candle_core::Device::Cpu);
        let mut opt = FrameOptimizer::with_adam(extractor, &style_image()?, test_config())?;
        let frame = Image::<f32, 3>::from_fn([6, 4].into(), |x, y| {
            [(x + y) as f32 / 8.0, 0.5, 0.25]
        })?;
        opt.set_frame(&frame, FrameKind::First)?;

        // the loss itself is finite
        assert_eq!(opt.loss_breakdown()?.total, 0.0);

        assert!(matches!(
            opt.step(),
            Err(StylizeError::NumericalDegeneracy("gradient"))
        ));
        assert_eq!(opt.current_frame()?, frame);
        Ok(())
    }

    // The pixels scaled by a huge factor as the only style feature.
    struct SteepExtractor(candle_core::Device);

    impl FeatureExtractor for SteepExtractor {
        fn device(&self) -> &candle_core::Device {
            &self.0
        }

        fn extract(&self, image: &Tensor) -> Result<Features, StylizeError> {
            Ok(Features {
                content: vec![],
                style: vec![image.affine(4.5e20, 0.0)?],
            })
        }
    }

    #[test]
    fn large_finite_gradient_is_accepted() -> Result<(), StylizeError> {
        // every gradient entry is finite while their sum overflows f32
        let config = StylizeConfig {
            style_weight: 1.0,
            ..test_config()
        };
        let style = Image::<u8, 3>::from_size_val([2, 2].into(), 127)?;
        let mut opt =
            FrameOptimizer::with_adam(SteepExtractor(candle_core::Device::Cpu), &style, config)?;
        opt.set_frame(&Image::from_size_val([2, 2].into(), 0.5)?, FrameKind::First)?;

        let breakdown = opt.step()?;
        assert!(breakdown.total.is_finite());
        assert!(breakdown.style > 1e30);
        Ok(())
    }

    #[test]
    fn identical_frames() -> Result<(), StylizeError> {
        let mut opt = optimizer(test_config())?;
        let frame = frame()?;

        opt.set_frame(&frame, FrameKind::First)?;
        let first = opt.optimize()?;

        opt.set_frame(&frame, FrameKind::Subsequent)?;

        let mask = opt.occlusion_mask().ok_or(StylizeError::NotInitialized)?;
        assert_eq!(mask.num_occluded(), 0);

        // zero motion leaves the previous result in place
        let warped = opt.warped_previous().ok_or(StylizeError::NotInitialized)?;
        for (a, b) in warped.as_slice().iter().zip(first.as_slice()) {
            approx::assert_relative_eq!(a, b, epsilon = 1e-6);
        }
        assert_eq!(opt.temporal_loss()?, 0.0);

        let warped = warped.clone();
        opt.optimize()?;

        // with nothing occluded the temporal loss is the plain mean squared error
        let expected = flowstyle_imgproc::metrics::mse(&opt.current_frame()?, &warped)?;
        approx::assert_relative_eq!(opt.temporal_loss()?, expected, max_relative = 1e-4);
        Ok(())
    }

    #[test]
    fn deterministic_replay() -> Result<(), StylizeError> {
        let run = || -> Result<Vec<Image<f32, 3>>, StylizeError> {
            let mut opt = optimizer(test_config())?;
            let frame = frame()?;
            let shifted = Image::<f32, 3>::from_fn(frame.size(), |x, y| {
                let p = frame.pixel(x.saturating_sub(1), y);
                [p[0], p[1], p[2]]
            })?;

            opt.set_frame(&frame, FrameKind::First)?;
            let a = opt.optimize()?;
            opt.set_frame(&shifted, FrameKind::Subsequent)?;
            let b = opt.optimize()?;
            Ok(vec![a, b])
        };

        let first = run()?;
        let second = run()?;
        for (a, b) in first.iter().zip(second.iter()) {
            for (x, y) in a.as_slice().iter().zip(b.as_slice()) {
                approx::assert_relative_eq!(x, y, epsilon = 1e-5);
            }
        }
        Ok(())
    }

    #[test]
    fn subsequent_frame_needs_a_previous_one() -> Result<(), StylizeError> {
        let mut opt = optimizer(test_config())?;
        assert!(matches!(
            opt.set_frame(&frame()?, FrameKind::Subsequent),
            Err(StylizeError::NotInitialized)
        ));
        assert!(matches!(opt.step(), Err(StylizeError::NotInitialized)));
        assert!(matches!(opt.optimize(), Err(StylizeError::NotInitialized)));
        Ok(())
    }

    #[test]
    fn frame_size_is_fixed() -> Result<(), StylizeError> {
        let mut opt = optimizer(test_config())?;
        assert_eq!(opt.frame_size(), None);
        opt.set_frame(&frame()?, FrameKind::First)?;
        opt.optimize()?;
        assert_eq!(opt.frame_size(), Some(frame()?.size()));

        let other = Image::<f32, 3>::from_size_val([8, 8].into(), 0.5)?;
        assert!(matches!(
            opt.set_frame(&other, FrameKind::Subsequent),
            Err(StylizeError::InputMismatch(_, _))
        ));
        Ok(())
    }
}
