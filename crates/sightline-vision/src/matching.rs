use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma};
use imageproc::integral_image::{integral_image, integral_squared_image};
use imageproc::template_matching::{MatchTemplateMethod, find_extremes, match_template};

use crate::candidate::MatchCandidate;
use crate::error::RecognizeError;
use crate::region::Region;
use crate::template::Template;

/// Slide `template` over `crop` and keep the best location if it clears `min_score`.
///
/// `region` is where `crop` sits in the frame; the candidate is reported in frame coordinates.
pub(crate) fn template_match(
  template: &Template,
  crop: &GrayImage,
  region: &Region,
  min_score: f32,
) -> Result<Option<MatchCandidate>, RecognizeError> {
  if template.width() > crop.width() || template.height() > crop.height() {
    return Err(RecognizeError::TemplateLargerThanRegion {
      template: template.name.clone(),
      template_width: template.width(),
      template_height: template.height(),
      region: *region,
    });
  }

  let scores = zero_mean_correlation(crop, &template.image);
  let extremes = find_extremes(&scores);
  let score = sanitize(extremes.max_value);

  if score < min_score {
    return Ok(None);
  }

  let (x, y) = extremes.max_value_location;
  let matched = region.offset(Region::new(x, y, template.width(), template.height()));
  Ok(Some(MatchCandidate::new(&template.name, matched, score)))
}

/// Zero-mean normalized correlation of the whole crop, resized to the template's size, against the template.
pub(crate) fn correlation_score(template: &Template, crop: &GrayImage) -> f32 {
  let resized = if crop.dimensions() == template.image.dimensions() {
    crop.clone()
  } else {
    imageops::resize(crop, template.width(), template.height(), FilterType::Triangle)
  };

  let scores = zero_mean_correlation(&resized, &template.image);
  sanitize(scores.get_pixel(0, 0).0[0])
}

/// Correlation coefficient of `template` against every window of `crop`.
///
/// Both sides have their mean removed before normalising, so brightness alone
/// never produces a match. Window sums come from integral images over the raw
/// cross-correlation. A window or template without variance scores 0.
fn zero_mean_correlation(crop: &GrayImage, template: &GrayImage) -> ImageBuffer<Luma<f32>, Vec<f32>> {
  let (tw, th) = template.dimensions();
  let n = f64::from(tw) * f64::from(th);

  let cross = match_template(crop, template, MatchTemplateMethod::CrossCorrelation);
  let sums = integral_image::<_, u64>(crop);
  let squares = integral_squared_image::<_, u64>(crop);

  let (t_sum, t_squares) = template.pixels().fold((0.0f64, 0.0f64), |(sum, sq), pixel| {
    let v = f64::from(pixel.0[0]);
    (sum + v, sq + v * v)
  });
  let t_var = t_squares - t_sum * t_sum / n;

  // Integral images are padded with a leading zero row and column.
  let window = |table: &ImageBuffer<Luma<u64>, Vec<u64>>, x: u32, y: u32| {
    let at = |x: u32, y: u32| table.get_pixel(x, y).0[0] as f64;
    at(x + tw, y + th) - at(x, y + th) - at(x + tw, y) + at(x, y)
  };

  ImageBuffer::from_fn(cross.width(), cross.height(), |x, y| {
    let i_sum = window(&sums, x, y);
    let i_var = window(&squares, x, y) - i_sum * i_sum / n;
    let numerator = f64::from(cross.get_pixel(x, y).0[0]) - i_sum * t_sum / n;
    let denominator = (i_var * t_var).sqrt();

    let score = if denominator > 1e-6 {
      numerator / denominator
    } else {
      0.0
    };
    Luma([score as f32])
  })
}

/// Anti-correlation counts as no match; non-finite scores as well.
fn sanitize(score: f32) -> f32 {
  if score.is_finite() {
    score.clamp(0.0, 1.0)
  } else {
    0.0
  }
}
