//! Deterministic transform fingerprints.
//!
//! A transform's *geometry string* encodes its dimensions, mode, position,
//! quality and interlace setting, but never its output format. Two
//! transforms with identical geometry but different requested formats share
//! a geometry string and differ only in the combined index fingerprint,
//! which is what makes artifact reuse matching possible.
//!
//! Named transforms have a second, equally-valid encoding of the same
//! geometry: `_{name}`. Reuse matching considers both forms.

use crate::transform::Transform;
use std::fmt::Write;

/// Compute the geometry string for a transform.
///
/// With `ignore_name` set, a named transform is encoded as if it were
/// anonymous; otherwise the name form `_{name}` is returned for named
/// transforms.
pub fn transform_string(transform: &Transform, ignore_name: bool) -> String {
    if !ignore_name {
        if let Some(name) = &transform.name {
            return format!("_{name}");
        }
    }

    let mut s = String::with_capacity(32);
    s.push('_');
    match transform.width {
        Some(w) => {
            let _ = write!(s, "{w}");
        }
        None => s.push_str("AUTO"),
    }
    s.push('x');
    match transform.height {
        Some(h) => {
            let _ = write!(s, "{h}");
        }
        None => s.push_str("AUTO"),
    }
    let _ = write!(s, "_{}_{}", transform.mode, transform.position);
    if let Some(q) = transform.quality {
        let _ = write!(s, "_{q}");
    }
    let _ = write!(s, "_{}", transform.interlace);
    s
}

/// Compute the combined in-memory cache key for one (asset, transform)
/// request: `assetId:geometry[:format]`.
///
/// The format segment is present only when the transform requests an
/// explicit output format.
pub fn index_fingerprint(asset_id: i64, transform: &Transform) -> String {
    let mut key = format!("{asset_id}:{}", transform_string(transform, false));
    if let Some(format) = transform.format {
        let _ = write!(key, ":{format}");
    }
    key
}

/// Reconstruct an anonymous transform from its geometry string.
///
/// Inverts [`transform_string`] for the anonymous form. Name forms
/// (`_{name}`) do not parse; callers holding one must resolve the named
/// definition through whatever registry owns it.
pub fn parse_transform_string(s: &str) -> crate::Result<Transform> {
    use crate::error::Error;
    use crate::transform::{Interlace, Position, TransformMode};

    let invalid = || Error::InvalidTransform(format!("not a geometry string: {s}"));

    let rest = s.strip_prefix('_').ok_or_else(invalid)?;
    let parts: Vec<&str> = rest.split('_').collect();
    if parts.len() < 4 || parts.len() > 5 {
        return Err(invalid());
    }

    let (w, h) = parts[0].split_once('x').ok_or_else(invalid)?;
    let parse_dim = |d: &str| -> crate::Result<Option<u32>> {
        if d == "AUTO" {
            Ok(None)
        } else {
            d.parse::<u32>().map(Some).map_err(|_| invalid())
        }
    };

    let (quality, interlace) = if parts.len() == 5 {
        let q = parts[3].parse::<u32>().map_err(|_| invalid())?;
        (Some(q), parts[4])
    } else {
        (None, parts[3])
    };

    let transform = Transform {
        name: None,
        width: parse_dim(w)?,
        height: parse_dim(h)?,
        mode: TransformMode::parse(parts[1])?,
        quality,
        format: None,
        interlace: Interlace::parse(interlace)?,
        position: Position::parse(parts[2])?,
        parameter_change_time: None,
    };
    transform.validate()?;
    Ok(transform)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::{ImageFormat, Interlace, Position, Transform, TransformMode};

    fn base() -> Transform {
        Transform::sized(100, 100)
    }

    #[test]
    fn deterministic() {
        let t = base();
        assert_eq!(transform_string(&t, false), transform_string(&t, false));
        assert_eq!(
            transform_string(&t, false),
            "_100x100_crop_center-center_none"
        );
    }

    #[test]
    fn auto_dimensions() {
        let mut t = base();
        t.height = None;
        assert_eq!(
            transform_string(&t, false),
            "_100xAUTO_crop_center-center_none"
        );
    }

    #[test]
    fn quality_segment_only_when_set() {
        let mut t = base();
        t.quality = Some(82);
        assert_eq!(
            transform_string(&t, false),
            "_100x100_crop_center-center_82_none"
        );
    }

    #[test]
    fn every_geometry_parameter_changes_the_string() {
        let t = base();
        let reference = transform_string(&t, false);

        let mut wider = t.clone();
        wider.width = Some(101);
        assert_ne!(transform_string(&wider, false), reference);

        let mut fitted = t.clone();
        fitted.mode = TransformMode::Fit;
        assert_ne!(transform_string(&fitted, false), reference);

        let mut positioned = t.clone();
        positioned.position = Position::TopLeft;
        assert_ne!(transform_string(&positioned, false), reference);

        let mut interlaced = t.clone();
        interlaced.interlace = Interlace::Line;
        assert_ne!(transform_string(&interlaced, false), reference);
    }

    #[test]
    fn format_never_affects_geometry_string() {
        let mut with_format = base();
        with_format.format = Some(ImageFormat::Webp);
        assert_eq!(
            transform_string(&with_format, false),
            transform_string(&base(), false)
        );
    }

    #[test]
    fn format_changes_combined_fingerprint() {
        let mut with_format = base();
        with_format.format = Some(ImageFormat::Webp);
        assert_ne!(
            index_fingerprint(7, &with_format),
            index_fingerprint(7, &base())
        );
        assert_eq!(
            index_fingerprint(7, &with_format),
            "7:_100x100_crop_center-center_none:webp"
        );
    }

    #[test]
    fn parse_inverts_anonymous_strings() {
        let mut t = base();
        t.quality = Some(82);
        t.mode = TransformMode::Fit;
        t.height = None;
        let s = transform_string(&t, false);
        let parsed = parse_transform_string(&s).unwrap();
        assert_eq!(parsed, t);

        let plain = parse_transform_string("_100x100_crop_center-center_none").unwrap();
        assert_eq!(plain, base());
    }

    #[test]
    fn parse_rejects_name_forms() {
        assert!(parse_transform_string("_thumb").is_err());
        assert!(parse_transform_string("no-leading-underscore").is_err());
    }

    #[test]
    fn named_form_and_anonymous_form() {
        let mut t = base();
        t.name = Some("thumb".to_string());
        assert_eq!(transform_string(&t, false), "_thumb");
        assert_eq!(
            transform_string(&t, true),
            "_100x100_crop_center-center_none"
        );
    }
}
