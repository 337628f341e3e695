//! Standard metadata keys
//!
//! Fixed keys are constants; keys with a device, site or channel parameter
//! are functions returning a filled [`MetadataKey`]. `*_custom` keys write
//! freeform fields.

use super::MetadataKey;

macro_rules! fixed {
    ($($(#[$doc:meta])* $name:ident => $template:literal;)*) => {
        $($(#[$doc])* pub const $name: MetadataKey = MetadataKey::new($template);)*
    };
}

macro_rules! per_item {
    ($($(#[$doc:meta])* $name:ident($arg:ident) => $template:literal;)*) => {
        $($(#[$doc])*
        #[must_use]
        pub fn $name($arg: &str) -> MetadataKey {
            MetadataKey::new($template).with($arg)
        })*
    };
}

fixed! {
    /// `general/data_collection`
    DATA_COLLECTION => "general/data_collection";
    /// `general/experiment_description`
    EXPERIMENT_DESCRIPTION => "general/experiment_description";
    /// `general/experimenter`
    EXPERIMENTER => "general/experimenter";
    /// `general/institution`
    INSTITUTION => "general/institution";
    /// `general/lab`
    LAB => "general/lab";
    /// `general/notes`
    NOTES => "general/notes";
    /// `general/protocol`
    PROTOCOL => "general/protocol";
    /// `general/pharmacology`
    PHARMACOLOGY => "general/pharmacology";
    /// `general/related_publications`
    RELATED_PUBLICATIONS => "general/related_publications";
    /// `general/session_id`
    SESSION_ID => "general/session_id";
    /// `general/slices`
    SLICES => "general/slices";
    /// `general/stimulus`
    STIMULUS => "general/stimulus";
    /// `general/surgery`
    SURGERY => "general/surgery";
    /// `general/virus`
    VIRUS => "general/virus";

    /// Subject description
    SUBJECT => "general/subject/description";
    /// `general/subject/subject_id`
    SUBJECT_ID => "general/subject/subject_id";
    /// `general/subject/species`
    SPECIES => "general/subject/species";
    /// `general/subject/genotype`
    GENOTYPE => "general/subject/genotype";
    /// `general/subject/sex`
    SEX => "general/subject/sex";
    /// `general/subject/age`
    AGE => "general/subject/age";
    /// `general/subject/weight`
    WEIGHT => "general/subject/weight";

    /// Electrode positions, one row per electrode
    ELECTRODE_MAP => "general/extracellular_ephys/electrode_map";
    /// Shank of each electrode
    ELECTRODE_GROUP => "general/extracellular_ephys/electrode_group";
    /// Impedance of each electrode
    IMPEDANCE => "general/extracellular_ephys/impedance";
    /// Extracellular filtering description
    FILTERING => "general/extracellular_ephys/filtering";
}

per_item! {
    /// Description of a recording device
    device(name) => "general/devices/{}";

    /// Shank description
    extra_shank_description(shank) => "general/extracellular_ephys/{}/description";
    /// Shank location
    extra_shank_location(shank) => "general/extracellular_ephys/{}/location";
    /// Shank device
    extra_shank_device(shank) => "general/extracellular_ephys/{}/device";

    /// Intracellular electrode description
    intra_electrode_description(electrode) => "general/intracellular_ephys/{}/description";
    /// Intracellular electrode filtering
    intra_electrode_filtering(electrode) => "general/intracellular_ephys/{}/filtering";
    /// Intracellular electrode device
    intra_electrode_device(electrode) => "general/intracellular_ephys/{}/device";
    /// Intracellular electrode location
    intra_electrode_location(electrode) => "general/intracellular_ephys/{}/location";
    /// Intracellular electrode resistance
    intra_electrode_resistance(electrode) => "general/intracellular_ephys/{}/resistance";
    /// Intracellular electrode seal
    intra_electrode_seal(electrode) => "general/intracellular_ephys/{}/seal";
    /// Intracellular electrode slice
    intra_electrode_slice(electrode) => "general/intracellular_ephys/{}/slice";
    /// Intracellular electrode initial access resistance
    intra_electrode_initial_access_resistance(electrode) =>
        "general/intracellular_ephys/{}/initial_access_resistance";

    /// Imaging site description
    image_site_description(site) => "general/optophysiology/{}/description";
    /// Imaging site manifold (pixel positions)
    image_site_manifold(site) => "general/optophysiology/{}/manifold";
    /// Calcium indicator
    image_site_indicator(site) => "general/optophysiology/{}/indicator";
    /// Excitation wavelength
    image_site_excitation_lambda(site) => "general/optophysiology/{}/excitation_lambda";
    /// Imaging rate
    image_site_imaging_rate(site) => "general/optophysiology/{}/imaging_rate";
    /// Imaging site location
    image_site_location(site) => "general/optophysiology/{}/location";
    /// Imaging site device
    image_site_device(site) => "general/optophysiology/{}/device";

    /// Optogenetic site description
    optogen_site_description(site) => "general/optogenetics/{}/description";
    /// Optogenetic site device
    optogen_site_device(site) => "general/optogenetics/{}/device";
    /// Stimulation wavelength
    optogen_site_lambda(site) => "general/optogenetics/{}/lambda";
    /// Optogenetic site location
    optogen_site_location(site) => "general/optogenetics/{}/location";
}

/// Emission wavelength of one channel of an imaging site
#[must_use]
pub fn image_site_channel_lambda(site: &str, channel: &str) -> MetadataKey {
    MetadataKey::new("general/optophysiology/{}/{}/emission_lambda")
        .with(site)
        .with(channel)
}

/// Description of one channel of an imaging site
#[must_use]
pub fn image_site_channel_description(site: &str, channel: &str) -> MetadataKey {
    MetadataKey::new("general/optophysiology/{}/{}/description")
        .with(site)
        .with(channel)
}

/// Freeform field directly under `general`
#[must_use]
pub fn general_custom(name: &str) -> MetadataKey {
    MetadataKey::custom("general/{}").with(name)
}

/// Freeform extracellular field
#[must_use]
pub fn extra_custom(name: &str) -> MetadataKey {
    MetadataKey::custom("general/extracellular_ephys/{}").with(name)
}

/// Freeform field of one shank
#[must_use]
pub fn extra_shank_custom(shank: &str, name: &str) -> MetadataKey {
    MetadataKey::custom("general/extracellular_ephys/{}/{}")
        .with(shank)
        .with(name)
}

/// Freeform intracellular field
#[must_use]
pub fn intra_custom(name: &str) -> MetadataKey {
    MetadataKey::custom("general/intracellular_ephys/{}").with(name)
}

/// Freeform field of one intracellular electrode
#[must_use]
pub fn intra_electrode_custom(electrode: &str, name: &str) -> MetadataKey {
    MetadataKey::custom("general/intracellular_ephys/{}/{}")
        .with(electrode)
        .with(name)
}

/// Freeform optophysiology field
#[must_use]
pub fn image_custom(name: &str) -> MetadataKey {
    MetadataKey::custom("general/optophysiology/{}").with(name)
}

/// Freeform field of one imaging site
#[must_use]
pub fn image_site_custom(site: &str, name: &str) -> MetadataKey {
    MetadataKey::custom("general/optophysiology/{}/{}")
        .with(site)
        .with(name)
}

/// Freeform optogenetics field
#[must_use]
pub fn optogen_custom(name: &str) -> MetadataKey {
    MetadataKey::custom("general/optogenetics/{}").with(name)
}

/// Freeform field of one optogenetic site
#[must_use]
pub fn optogen_site_custom(site: &str, name: &str) -> MetadataKey {
    MetadataKey::custom("general/optogenetics/{}/{}")
        .with(site)
        .with(name)
}
