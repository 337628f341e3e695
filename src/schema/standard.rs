//! Built-in series type table

use super::{TypeRegistry, TypeSpec};

/// Build the standard registry. Parents are derived before their subtypes.
pub(super) fn build() -> TypeRegistry {
    let mut registry = TypeRegistry::new();

    let series = registry.derive(
        "TimeSeries",
        None,
        TypeSpec::new()
            .optional(&[
                "data",
                "timestamps",
                "starting_time",
                "num_samples",
                "description",
                "comment",
                "source",
                "control",
                "control_description",
            ])
            .exclusive("timestamps", "starting_time"),
    );

    registry.derive(
        "AnnotationSeries",
        Some(&series),
        TypeSpec::new().required(&["data", "timestamps"]),
    );
    registry.derive(
        "IntervalSeries",
        Some(&series),
        TypeSpec::new().required(&["data", "timestamps"]),
    );
    registry.derive(
        "AbstractFeatureSeries",
        Some(&series),
        TypeSpec::new().required(&["data", "timestamps", "features", "feature_units"]),
    );
    registry.derive(
        "ElectricalSeries",
        Some(&series),
        TypeSpec::new().required(&["data", "electrode_idx"]),
    );
    registry.derive(
        "SpatialSeries",
        Some(&series),
        TypeSpec::new().required(&["data", "reference_frame"]),
    );
    registry.derive(
        "RoiResponseSeries",
        Some(&series),
        TypeSpec::new()
            .required(&["data", "roi_names"])
            .optional(&["segmentation_interface_path"]),
    );

    let image = registry.derive(
        "ImageSeries",
        Some(&series),
        TypeSpec::new().optional(&[
            "external_file",
            "format",
            "bits_per_pixel",
            "dimension",
            "starting_frame",
        ]),
    );
    registry.derive(
        "TwoPhotonSeries",
        Some(&image),
        TypeSpec::new()
            .required(&["imaging_plane"])
            .optional(&["field_of_view", "pmt_gain", "scan_line_rate"]),
    );
    registry.derive(
        "OpticalSeries",
        Some(&image),
        TypeSpec::new().optional(&["distance", "field_of_view", "orientation"]),
    );

    registry
}

#[cfg(test)]
mod tests {
    use crate::schema::FieldRule;

    use super::*;

    #[test]
    fn test_standard_table() {
        let registry = build();
        assert_eq!(registry.len(), 11);
        for name in registry.names() {
            let ty = registry.resolve(name).unwrap();
            assert_eq!(ty.chain().first().map(String::as_str), Some(name));
            assert_eq!(ty.chain().last().map(String::as_str), Some("TimeSeries"));
            assert_eq!(ty.family(), "TimeSeries");
        }
    }

    #[test]
    fn test_two_photon_ancestry() {
        let registry = build();
        let ty = registry.resolve("TwoPhotonSeries").unwrap();
        assert_eq!(
            ty.ancestry(),
            vec!["TimeSeries", "ImageSeries", "TwoPhotonSeries"]
        );
        assert_eq!(ty.rule("imaging_plane"), Some(FieldRule::Required));
        assert_eq!(ty.rule("format"), Some(FieldRule::Optional));
    }

    #[test]
    fn test_timeseries_has_no_required_fields() {
        let registry = build();
        let ty = registry.resolve("TimeSeries").unwrap();
        assert_eq!(ty.required().count(), 0);
        assert_eq!(ty.alternative("starting_time"), Some("timestamps"));
    }

    #[test]
    fn test_annotation_promotes_data_and_timestamps() {
        let registry = build();
        let ty = registry.resolve("AnnotationSeries").unwrap();
        assert_eq!(ty.rule("data"), Some(FieldRule::Required));
        assert_eq!(ty.rule("timestamps"), Some(FieldRule::Required));
        assert_eq!(ty.rule("comment"), Some(FieldRule::Optional));
    }
}
