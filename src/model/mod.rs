pub(crate) mod ctc_model;
pub(crate) mod encoder;
pub(crate) mod feature_extractor;
pub(crate) mod layers;
