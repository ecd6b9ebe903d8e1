//! Compiled-in model catalog and environment configuration.

use serde::Serialize;

/// Prompt limit used when neither the sub-model nor its provider declares one.
pub const DEFAULT_PROMPT_MAX_LENGTH: usize = 300;

/// Environment variable overriding the OpenAI base URL.
pub const OPENAI_BASE_URL_ENV: &str = "OPENAI_API_BASE_URL";

/// Default OpenAI base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// One concrete, callable model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubModelConfig {
    /// Display label.
    pub label: &'static str,
    /// Model id, unique across the whole catalog.
    pub value: &'static str,
    /// Human-readable price.
    pub price: &'static str,
    /// Prompt limit in characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_max_length: Option<usize>,
    /// Languages the prompt may be written in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_support_lang: Option<&'static str>,
    /// Whether a negative prompt is accepted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt_support: Option<bool>,
    /// Negative prompt limit in characters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt_max_length: Option<usize>,
}

/// A vendor and its sub-models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelProviderConfig {
    /// Display name.
    pub name: &'static str,
    /// Provider id.
    pub value: &'static str,
    /// Vendor documentation.
    pub url: &'static str,
    /// Key name the credential is stored under.
    pub api_key_name: &'static str,
    /// Default prompt limit for sub-models.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_max_length: Option<usize>,
    /// Default prompt languages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_support_lang: Option<&'static str>,
    /// Default negative prompt support.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt_support: Option<bool>,
    /// Default negative prompt limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative_prompt_max_length: Option<usize>,
    /// Concrete models.
    pub children: &'static [SubModelConfig],
}

impl ModelProviderConfig {
    /// Looks up a sub-model of this provider.
    pub fn sub_model(&self, model: &str) -> Option<&'static SubModelConfig> {
        self.children.iter().find(|sub| sub.value == model)
    }

    /// Effective prompt limit: sub-model, then provider, then
    /// [`DEFAULT_PROMPT_MAX_LENGTH`].
    pub fn prompt_max_length(&self, model: &str) -> usize {
        self.sub_model(model)
            .and_then(|sub| sub.prompt_max_length)
            .or(self.prompt_max_length)
            .unwrap_or(DEFAULT_PROMPT_MAX_LENGTH)
    }

    /// Whether `model` accepts a negative prompt.
    pub fn supports_negative_prompt(&self, model: &str) -> bool {
        self.sub_model(model)
            .and_then(|sub| sub.negative_prompt_support)
            .or(self.negative_prompt_support)
            .unwrap_or(false)
    }

    /// Effective negative prompt limit, zero when undeclared.
    pub fn negative_prompt_max_length(&self, model: &str) -> usize {
        self.sub_model(model)
            .and_then(|sub| sub.negative_prompt_max_length)
            .or(self.negative_prompt_max_length)
            .unwrap_or(0)
    }
}

const fn sub(
    label: &'static str,
    value: &'static str,
    price: &'static str,
    prompt_max_length: usize,
) -> SubModelConfig {
    SubModelConfig {
        label,
        value,
        price,
        prompt_max_length: Some(prompt_max_length),
        prompt_support_lang: None,
        negative_prompt_support: None,
        negative_prompt_max_length: None,
    }
}

const fn with_lang(model: SubModelConfig, lang: &'static str) -> SubModelConfig {
    SubModelConfig {
        prompt_support_lang: Some(lang),
        ..model
    }
}

const fn with_negative(model: SubModelConfig) -> SubModelConfig {
    SubModelConfig {
        negative_prompt_support: Some(true),
        ..model
    }
}

const ZH_EN: &str = "Chinese, English";

const fn bilingual(
    label: &'static str,
    value: &'static str,
    price: &'static str,
    prompt_max_length: usize,
) -> SubModelConfig {
    with_lang(sub(label, value, price, prompt_max_length), ZH_EN)
}

/// The model catalog, in display order.
pub static MODELS: &[ModelProviderConfig] = &[
    ModelProviderConfig {
        name: "Zhipu AI CogView",
        value: "cogview",
        url: "https://bigmodel.cn/dev/howuse/cogview",
        api_key_name: "zhipuai_key",
        prompt_max_length: Some(9999),
        prompt_support_lang: None,
        negative_prompt_support: None,
        negative_prompt_max_length: None,
        children: &[
            sub("CogView-4-250304", "cogview-4-250304", "0.06 CNY/image", 9999),
            sub("CogView-4", "cogview-4", "0.06 CNY/call", 9999),
            sub("CogView-3-Flash", "cogview-3-flash", "free", 9999),
            sub("CogView-3", "cogview-3", "free", 9999),
        ],
    },
    ModelProviderConfig {
        name: "OpenAI Images",
        value: "openai",
        url: "https://platform.openai.com/docs/api-reference/images",
        api_key_name: "openai_key",
        prompt_max_length: Some(4000),
        prompt_support_lang: Some(ZH_EN),
        negative_prompt_support: Some(false),
        negative_prompt_max_length: None,
        children: &[
            bilingual("GPT-Image-1 (high)", "gpt-image-1-high", "$0.167-0.25/image", 32000),
            bilingual("GPT-Image-1 (medium)", "gpt-image-1-medium", "$0.042-0.063/image", 32000),
            bilingual("GPT-Image-1 (low)", "gpt-image-1-low", "$0.011-0.016/image", 32000),
            bilingual("DALL·E 3 (HD)", "dall-e-3-hd", "$0.08-0.12/image", 4000),
            bilingual("DALL·E 3 (standard)", "dall-e-3-standard", "$0.04-0.08/image", 4000),
            bilingual("DALL·E 2", "dall-e-2", "$0.016-0.02/image", 1000),
        ],
    },
    ModelProviderConfig {
        name: "Alibaba Cloud Tongyi Wanx V2",
        value: "wanx2",
        url: "https://help.aliyun.com/zh/model-studio/text-to-image-v2-api-reference",
        api_key_name: "aliyun_wanx_key",
        prompt_max_length: Some(800),
        prompt_support_lang: Some(ZH_EN),
        negative_prompt_support: Some(true),
        negative_prompt_max_length: Some(500),
        children: &[
            with_negative(bilingual(
                "wanx2.1-t2i-turbo",
                "wanx2.1-t2i-turbo",
                "0.14 CNY/image",
                800,
            )),
            with_negative(bilingual("wanx2.1-t2i-plus", "wanx2.1-t2i-plus", "0.20 CNY/image", 800)),
            with_negative(bilingual(
                "wanx2.0-t2i-turbo",
                "wanx2.0-t2i-turbo",
                "0.04 CNY/image",
                800,
            )),
        ],
    },
    ModelProviderConfig {
        name: "Baidu Qianfan",
        value: "qianfan",
        url: "https://cloud.baidu.com/doc/qianfan-api/s/8m7u6un8a",
        api_key_name: "baidu_qianfan_key",
        prompt_max_length: Some(220),
        prompt_support_lang: None,
        negative_prompt_support: None,
        negative_prompt_max_length: None,
        children: &[
            bilingual("irag-1.0", "irag-1.0", "0.14 CNY/image", 220),
            with_lang(sub("flux.1-schnell", "flux.1-schnell", "0.14 CNY/image", 512), "English"),
        ],
    },
    ModelProviderConfig {
        name: "Volcengine Doubao",
        value: "doubaoimg",
        url: "https://www.volcengine.com/docs/6791/1366783",
        api_key_name: "volcengine_key",
        prompt_max_length: Some(500),
        prompt_support_lang: Some(ZH_EN),
        negative_prompt_support: Some(true),
        negative_prompt_max_length: Some(500),
        children: &[
            with_negative(bilingual(
                "General 2.1 text-to-image",
                "doubaoimg-text2img-v2.1",
                "0.2 CNY/image",
                500,
            )),
            with_negative(bilingual(
                "General 2.0 Pro text-to-image",
                "doubaoimg-text2img-v2.0pro",
                "0.2 CNY/image",
                500,
            )),
            with_negative(bilingual(
                "General 2.0 text-to-image",
                "doubaoimg-text2img-v2.0",
                "0.2 CNY/image",
                500,
            )),
        ],
    },
    ModelProviderConfig {
        name: "MiniMax",
        value: "minimax",
        url: "https://www.minimax.io/platform/document/image_generation",
        api_key_name: "minimax_key",
        prompt_max_length: Some(1500),
        prompt_support_lang: Some(ZH_EN),
        negative_prompt_support: None,
        negative_prompt_max_length: None,
        children: &[with_lang(sub("image-01", "image-01", "0.025 CNY/image", 1500), ZH_EN)],
    },
];

/// Finds the provider config whose id or one of whose sub-model ids is `id`.
pub fn find_model_config(id: &str) -> Option<&'static ModelProviderConfig> {
    MODELS
        .iter()
        .find(|p| p.value == id || p.sub_model(id).is_some())
}

/// Finds a sub-model and the provider that owns it.
pub fn find_sub_model(
    model: &str,
) -> Option<(&'static ModelProviderConfig, &'static SubModelConfig)> {
    MODELS
        .iter()
        .find_map(|p| p.sub_model(model).map(|sub| (p, sub)))
}

/// Environment variable that pins the credential stored under `key_name`.
pub fn env_var_for(key_name: &str) -> Option<&'static str> {
    match key_name {
        "zhipuai_key" => Some("ZHIPU_API_KEY"),
        "openai_key" => Some("OPENAI_API_KEY"),
        "aliyun_wanx_key" => Some("DASHSCOPE_API_KEY"),
        "baidu_qianfan_key" => Some("QIANFAN_API_KEY"),
        "volcengine_key" => Some("VOLCENGINE_API_KEY"),
        "minimax_key" => Some("MINIMAX_API_KEY"),
        _ => None,
    }
}

/// OpenAI base URL from [`OPENAI_BASE_URL_ENV`], or the public endpoint.
pub fn openai_base_url() -> String {
    std::env::var(OPENAI_BASE_URL_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(|v| v.trim_end_matches('/').to_string())
        .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_model_ids_are_unique() {
        let mut seen = HashSet::new();
        for provider in MODELS {
            assert!(seen.insert(provider.value), "duplicate {}", provider.value);
            for sub in provider.children {
                assert!(seen.insert(sub.value), "duplicate {}", sub.value);
            }
        }
    }

    #[test]
    fn test_every_key_name_has_env_var() {
        for provider in MODELS {
            assert!(env_var_for(provider.api_key_name).is_some());
        }
    }

    #[test]
    fn test_find_model_config() {
        assert_eq!(find_model_config("dall-e-2").unwrap().value, "openai");
        assert_eq!(find_model_config("wanx2").unwrap().value, "wanx2");
        assert!(find_model_config("nope").is_none());
    }

    #[test]
    fn test_effective_prompt_limit() {
        let (openai, _) = find_sub_model("gpt-image-1-low").unwrap();
        assert_eq!(openai.prompt_max_length("gpt-image-1-low"), 32000);
        assert_eq!(openai.prompt_max_length("dall-e-9"), 4000);

        let bare = ModelProviderConfig {
            prompt_max_length: None,
            ..*openai
        };
        assert_eq!(bare.prompt_max_length("unknown"), DEFAULT_PROMPT_MAX_LENGTH);
    }

    #[test]
    fn test_negative_prompt_resolution() {
        let wanx = find_model_config("wanx2").unwrap();
        assert!(wanx.supports_negative_prompt("wanx2.1-t2i-plus"));
        assert_eq!(wanx.negative_prompt_max_length("wanx2.1-t2i-plus"), 500);

        let openai = find_model_config("openai").unwrap();
        assert!(!openai.supports_negative_prompt("dall-e-3-hd"));

        let cogview = find_model_config("cogview").unwrap();
        assert!(!cogview.supports_negative_prompt("cogview-4"));
        assert_eq!(cogview.negative_prompt_max_length("cogview-4"), 0);
    }

    #[test]
    fn test_openai_base_url_override() {
        temp_env::with_var(OPENAI_BASE_URL_ENV, Some("https://proxy.local/"), || {
            assert_eq!(openai_base_url(), "https://proxy.local");
        });
        temp_env::with_var(OPENAI_BASE_URL_ENV, None::<&str>, || {
            assert_eq!(openai_base_url(), DEFAULT_OPENAI_BASE_URL);
        });
    }
}
