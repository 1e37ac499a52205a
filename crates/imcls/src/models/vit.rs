//! # Token Transformer
//!
//! [`Vit`] treats each spatial position of the extractor feature map as a token,
//! projects it to ``d_model``, prepends a learned class token, adds a learned
//! position embedding, and runs a [`TransformerEncoder`]. The class token's
//! final state is the image embedding.

use bimm_contracts::unpack_shape_contract;
use burn::module::{Module, Param};
use burn::nn::transformer::{TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput};
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig};
use burn::prelude::{Backend, Config, Tensor};
use burn::tensor::Distribution;

/// [`Vit`] Config.
#[derive(Config, Debug)]
pub struct VitConfig {
    /// Token embedding size.
    pub d_model: usize,

    /// Attention heads; must divide ``d_model``.
    pub n_heads: usize,

    /// Encoder layers.
    pub n_layers: usize,

    /// Feed-forward hidden size.
    #[config(default = "None")]
    pub d_ff: Option<usize>,

    /// Maximum feature-map tokens (``height * width``) accepted.
    #[config(default = "256")]
    pub max_tokens: usize,

    /// Dropout rate.
    #[config(default = "0.0")]
    pub dropout: f64,

    /// Pretrained weights for the transformer: a local record path or URL.
    #[config(default = "None")]
    pub pretrained: Option<String>,
}

impl VitConfig {
    /// Check that ``n_heads`` is non-zero and divides ``d_model``.
    pub fn check_heads(&self) -> Result<(), String> {
        if self.n_heads == 0 || self.d_model % self.n_heads != 0 {
            return Err(format!(
                "d_model ({}) must be a multiple of n_heads ({})",
                self.d_model, self.n_heads
            ));
        }
        Ok(())
    }

    /// Initialize a [`Vit`].
    ///
    /// # Arguments
    ///
    /// - `in_planes`: feature planes of the incoming feature map.
    /// - `device`: the target device.
    ///
    /// # Panics
    ///
    /// If [`VitConfig::check_heads`] fails.
    pub fn init<B: Backend>(
        &self,
        in_planes: usize,
        device: &B::Device,
    ) -> Vit<B> {
        if let Err(message) = self.check_heads() {
            panic!("{message}");
        }

        let d_ff = self.d_ff.unwrap_or(4 * self.d_model);

        Vit {
            proj: LinearConfig::new(in_planes, self.d_model).init(device),
            cls_token: Param::from_tensor(Tensor::random(
                [1, 1, self.d_model],
                Distribution::Normal(0.0, 0.02),
                device,
            )),
            pos_embed: Param::from_tensor(Tensor::random(
                [1, self.max_tokens + 1, self.d_model],
                Distribution::Normal(0.0, 0.02),
                device,
            )),
            encoder: TransformerEncoderConfig::new(
                self.d_model,
                d_ff,
                self.n_heads,
                self.n_layers,
            )
            .with_dropout(self.dropout)
            .with_norm_first(true)
            .init(device),
            norm: LayerNormConfig::new(self.d_model).init(device),
            max_tokens: self.max_tokens,
        }
    }
}

/// Token transformer over a feature map.
#[derive(Module, Debug)]
pub struct Vit<B: Backend> {
    /// Feature plane -> token projection.
    pub proj: Linear<B>,

    /// Learned class token, ``[1, 1, d_model]``.
    pub cls_token: Param<Tensor<B, 3>>,

    /// Learned position embedding, ``[1, max_tokens + 1, d_model]``.
    pub pos_embed: Param<Tensor<B, 3>>,

    /// Encoder stack.
    pub encoder: TransformerEncoder<B>,

    /// Output norm.
    pub norm: LayerNorm<B>,

    /// Maximum feature-map tokens.
    pub max_tokens: usize,
}

impl<B: Backend> Vit<B> {
    /// Token embedding size.
    pub fn d_model(&self) -> usize {
        self.cls_token.dims()[2]
    }

    /// Forward Pass.
    ///
    /// # Arguments
    ///
    /// - `features`: ``[batch, planes, height, width]``.
    ///
    /// # Returns
    ///
    /// ``[batch, d_model]``; the class token embedding.
    ///
    /// # Panics
    ///
    /// If ``height * width`` exceeds ``max_tokens``.
    pub fn forward(
        &self,
        features: Tensor<B, 4>,
    ) -> Tensor<B, 2> {
        let [batch, height, width] = unpack_shape_contract!(
            ["batch", "planes", "height", "width"],
            &features,
            &["batch", "height", "width"],
            &[("planes", self.proj.weight.dims()[0])],
        );
        let tokens = height * width;
        assert!(
            tokens <= self.max_tokens,
            "feature map has {tokens} tokens; max_tokens is {}",
            self.max_tokens
        );
        let d_model = self.d_model();

        // [B, C, H, W] -> [B, H*W, C]
        let x = features.flatten::<3>(2, 3).swap_dims(1, 2);
        let x = self.proj.forward(x);

        let cls = self.cls_token.val().repeat_dim(0, batch);
        let x = Tensor::cat(vec![cls, x], 1);

        let pos = self
            .pos_embed
            .val()
            .slice([0..1, 0..tokens + 1, 0..d_model]);
        let x = x + pos;

        let x = self.encoder.forward(TransformerEncoderInput::new(x));
        let x = self.norm.forward(x);

        x.slice([0..batch, 0..1, 0..d_model])
            .reshape([batch, d_model])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bimm_contracts::assert_shape_contract;
    use burn::backend::NdArray;

    #[test]
    fn test_vit_config() {
        let config = VitConfig::new(16, 2, 1);
        assert_eq!(config.max_tokens, 256);
        assert_eq!(config.d_ff, None);
        assert!(config.pretrained.is_none());
        assert!(config.check_heads().is_ok());
    }

    #[test]
    fn test_check_heads() {
        let err = VitConfig::new(16, 3, 1).check_heads().unwrap_err();
        assert!(err.contains("n_heads (3)"), "{err}");
        assert!(VitConfig::new(16, 0, 1).check_heads().is_err());
    }

    #[test]
    fn test_vit_forward() {
        type B = NdArray;
        let device = Default::default();

        let vit: Vit<B> = VitConfig::new(16, 2, 1)
            .with_max_tokens(16)
            .init(8, &device);
        assert_eq!(vit.d_model(), 16);

        let output = vit.forward(Tensor::ones([2, 8, 4, 4], &device));
        assert_shape_contract!(
            ["batch", "d_model"],
            &output,
            &[("batch", 2), ("d_model", 16)],
        );
    }

    #[test]
    #[should_panic(expected = "max_tokens")]
    fn test_vit_too_many_tokens() {
        type B = NdArray;
        let device = Default::default();

        let vit: Vit<B> = VitConfig::new(16, 2, 1)
            .with_max_tokens(4)
            .init(8, &device);
        let _ = vit.forward(Tensor::ones([1, 8, 4, 4], &device));
    }
}
