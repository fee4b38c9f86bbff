mod ffmpeg_cmd;
mod image_cmd;
mod output;
mod profile;
mod scan;
mod types;

pub use ffmpeg_cmd::{
    DEFAULT_ENCODE_TIMEOUT, DEFAULT_THUMBNAIL_TIMEOUT, FrameSize, concat_list_contents,
    effective_backend, format_commands, resolve, resolve_concat, resolve_thumbnail,
    resolve_trim_copy, split_extra_args, validate_intent,
};
pub use image_cmd::{
    DEFAULT_DECODE_TIMEOUT, DEFAULT_IMAGE_TIMEOUT, IntermediateDecoder, JobPlan, JxrLibDecoder,
    WicDecoder, plan_image_job, plan_with_decoder, platform_decoder, resolve_image,
};
pub use output::{COLLISION_SUFFIX, derive_output_path, join_output_path, same_file};
pub use profile::{IMAGE_EXTENSIONS, VIDEO_EXTENSIONS, quality_value};
pub use scan::{collect_inputs, is_image_file, is_jpeg_xr, is_video_file, scan_streaming};
pub use types::{
    AudioPolicy, BatchReport, CodecFamily, EncodeIntent, ImageFormat, ImageIntent, Job,
    JobRecord, JobResult, Operation, QualityTier, ResolutionTier, ResolvedCommand, Timestamp,
    TrimWindow, display_command,
};

pub(crate) use types::file_label;
