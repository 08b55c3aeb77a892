use std::path::Path;

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Conv2d, Conv2dConfig, VarBuilder};

use crate::{
    error::StylizeError,
    features::{gram_matrix, FeatureExtractor, Features},
};

/// Layout of a VGG style network.
///
/// Block `b` holds `blocks[b]` 3x3 convolutions with `channels[b]` output
/// channels, each followed by a ReLU. Blocks are separated by 2x2 max pooling.
#[derive(Clone, Debug, PartialEq)]
pub struct VggConfig {
    /// Number of convolutions per block.
    pub blocks: Vec<usize>,
    /// Output channels per block.
    pub channels: Vec<usize>,
}

impl VggConfig {
    /// The VGG19 feature layout.
    pub fn vgg19() -> Self {
        Self {
            blocks: vec![2, 2, 4, 4, 4],
            channels: vec![64, 128, 256, 512, 512],
        }
    }

    /// Names of all convolution layers, `block{b}_conv{c}` counted from one.
    pub fn layer_names(&self) -> Vec<String> {
        self.blocks
            .iter()
            .enumerate()
            .flat_map(|(b, &n)| (1..=n).map(move |c| layer_name(b, c - 1)))
            .collect()
    }
}

fn layer_name(block: usize, conv: usize) -> String {
    format!("block{}_conv{}", block + 1, conv + 1)
}

/// A VGG style convolutional network returning intermediate activations.
pub struct Vgg {
    blocks: Vec<Vec<Conv2d>>,
    config: VggConfig,
}

impl Vgg {
    // ImageNet statistics the weights were trained with
    const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
    const STD: [f32; 3] = [0.229, 0.224, 0.225];

    /// Build the network, reading the weights of layer `name` from
    /// `{name}.weight` and `{name}.bias`.
    pub fn new(vb: VarBuilder, config: VggConfig) -> Result<Self, StylizeError> {
        if config.blocks.len() != config.channels.len() {
            return Err(StylizeError::InvalidConfig(format!(
                "vgg config has {} blocks but {} channel counts",
                config.blocks.len(),
                config.channels.len()
            )));
        }

        let conv_config = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };

        let mut in_channels = 3;
        let mut blocks = Vec::with_capacity(config.blocks.len());
        for (b, (&num_convs, &out_channels)) in
            config.blocks.iter().zip(config.channels.iter()).enumerate()
        {
            let mut convs = Vec::with_capacity(num_convs);
            for c in 0..num_convs {
                let conv = candle_nn::conv2d(
                    in_channels,
                    out_channels,
                    3,
                    conv_config,
                    vb.pp(layer_name(b, c)),
                )?;
                convs.push(conv);
                in_channels = out_channels;
            }
            blocks.push(convs);
        }

        Ok(Self { blocks, config })
    }

    /// Load the network from a safetensors file.
    pub fn from_safetensors(
        path: impl AsRef<Path>,
        config: VggConfig,
        device: &Device,
    ) -> Result<Self, StylizeError> {
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[path.as_ref()], DType::F32, device)?
        };
        Self::new(vb, config)
    }

    /// The layout of the network.
    pub fn config(&self) -> &VggConfig {
        &self.config
    }

    /// Run the network on an image with shape (1, 3, H, W) and values in
    /// `[0, 1]`, returning the activation of every requested layer.
    ///
    /// Layers past the deepest requested one are not evaluated.
    pub fn forward_layers(
        &self,
        image: &Tensor,
        layers: &[String],
    ) -> Result<Vec<Tensor>, StylizeError> {
        let device = image.device();
        let mean = Tensor::new(&Self::MEAN, device)?.reshape((1, 3, 1, 1))?;
        let std = Tensor::new(&Self::STD, device)?.reshape((1, 3, 1, 1))?;

        let mut outputs: Vec<Option<Tensor>> = vec![None; layers.len()];
        let mut remaining = layers.len();
        let mut x = image.broadcast_sub(&mean)?.broadcast_div(&std)?;

        'blocks: for (b, convs) in self.blocks.iter().enumerate() {
            if b > 0 {
                x = x.max_pool2d(2)?;
            }
            for (c, conv) in convs.iter().enumerate() {
                x = conv.forward(&x)?.relu()?;

                let name = layer_name(b, c);
                for (slot, layer) in outputs.iter_mut().zip(layers) {
                    if slot.is_none() && *layer == name {
                        *slot = Some(x.clone());
                        remaining -= 1;
                    }
                }

                if remaining == 0 {
                    break 'blocks;
                }
            }
        }

        outputs
            .into_iter()
            .zip(layers)
            .map(|(out, layer)| {
                out.ok_or_else(|| {
                    StylizeError::InvalidConfig(format!("unknown vgg layer {layer}"))
                })
            })
            .collect()
    }
}

/// [`FeatureExtractor`] reading content activations and style gram matrices
/// from a [`Vgg`] network.
pub struct VggExtractor {
    vgg: Vgg,
    // content layers first, then style layers
    layers: Vec<String>,
    num_content: usize,
    device: Device,
}

impl VggExtractor {
    /// Create an extractor for the given layers.
    ///
    /// # Errors
    ///
    /// [`StylizeError::InvalidConfig`] if a layer is not part of the network.
    pub fn new(
        vgg: Vgg,
        content_layers: Vec<String>,
        style_layers: Vec<String>,
        device: Device,
    ) -> Result<Self, StylizeError> {
        let known = vgg.config().layer_names();
        if let Some(unknown) = content_layers
            .iter()
            .chain(style_layers.iter())
            .find(|layer| !known.contains(layer))
        {
            return Err(StylizeError::InvalidConfig(format!(
                "unknown vgg layer {unknown}"
            )));
        }

        let num_content = content_layers.len();
        let layers = content_layers.into_iter().chain(style_layers).collect();

        Ok(Self {
            vgg,
            layers,
            num_content,
            device,
        })
    }

    /// Load a VGG19 from safetensors on the first CUDA device, or the CPU when
    /// CUDA is not available.
    pub fn vgg19(
        weights: impl AsRef<Path>,
        content_layers: Vec<String>,
        style_layers: Vec<String>,
    ) -> Result<Self, StylizeError> {
        // set the device to cuda if available, otherwise use cpu
        let device = match Device::cuda_if_available(0) {
            Ok(device) => device,
            Err(e) => {
                log::warn!("Failed to use CUDA, using CPU instead: {}", e);
                Device::Cpu
            }
        };

        let vgg = Vgg::from_safetensors(weights, VggConfig::vgg19(), &device)?;
        Self::new(vgg, content_layers, style_layers, device)
    }
}

impl FeatureExtractor for VggExtractor {
    fn device(&self) -> &Device {
        &self.device
    }

    fn extract(&self, image: &Tensor) -> Result<Features, StylizeError> {
        match image.dims() {
            [1, 3, h, w] if *h > 0 && *w > 0 => {}
            dims => {
                return Err(StylizeError::ExtractionFailure(format!(
                    "expected an image tensor of shape (1, 3, H, W), got {dims:?}"
                )))
            }
        }

        let mut activations = self
            .vgg
            .forward_layers(image, &self.layers)
            .map_err(|e| StylizeError::ExtractionFailure(e.to_string()))?;

        let style = activations
            .split_off(self.num_content)
            .iter()
            .map(gram_matrix)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Features {
            content: activations,
            style,
        })
    }
}
