use leptess::tesseract;
use leptess::tesseract::TessApi;
use opencv::prelude::Mat;
use opencv::prelude::MatTraitConst;
use opencv::prelude::MatTraitConstManual;
use std::ffi::CString;
use tesseract_plumbing::TessBaseApi;
use tracing::debug;
use tracing::info;

use crate::config::OcrConfig;
use crate::PlateError;
use crate::Result;

/// Turns a single-channel plate crop into text.
pub trait OcrEngine {
    fn recognize(&mut self, grey: &Mat) -> Result<String>;
}

pub struct TesseractOcr {
    api: TessApi,
}

impl TesseractOcr {
    pub fn new(config: &OcrConfig) -> Result<Self> {
        let mut api = tesseract::TessApi::new(config.data_path.as_deref(), &config.language)
            .map_err(|e| PlateError::Ocr(format!("cannot initialise tesseract: {e:?}")))?;

        set_variable(
            &mut api.raw,
            "tessedit_pageseg_mode",
            &config.page_seg_mode.to_string(),
        )?;
        if let Some(whitelist) = &config.char_whitelist {
            set_variable(&mut api.raw, "tessedit_char_whitelist", whitelist)?;
        }

        info!(
            language = %config.language,
            psm = config.page_seg_mode,
            "tesseract ready"
        );
        Ok(Self { api })
    }
}

fn set_variable(raw: &mut TessBaseApi, name: &str, value: &str) -> Result<()> {
    let name_c = CString::new(name).map_err(|e| PlateError::Ocr(e.to_string()))?;
    let value_c = CString::new(value).map_err(|e| PlateError::Ocr(e.to_string()))?;
    raw.set_variable(&name_c, &value_c)
        .map_err(|e| PlateError::Ocr(format!("cannot set {name}={value}: {e:?}")))
}

impl OcrEngine for TesseractOcr {
    fn recognize(&mut self, grey: &Mat) -> Result<String> {
        if grey.empty() {
            return Ok(String::new());
        }

        // Tesseract wants a tightly packed buffer; crops are views into the frame.
        let packed = grey.try_clone()?;
        let cols = packed.cols();
        let rows = packed.rows();
        self.api
            .raw
            .set_image(packed.data_bytes()?, cols, rows, 1, cols)
            .map_err(|e| PlateError::Ocr(format!("{e:?}")))?;

        let text = self
            .api
            .get_utf8_text()
            .map_err(|e| PlateError::Ocr(e.to_string()))?;
        debug!(text = %text.trim(), cols, rows, "ocr pass");
        Ok(text.trim().to_string())
    }
}
