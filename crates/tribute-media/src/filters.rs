//! FFmpeg filter graph fragments.

use tribute_models::encoding::{AUDIO_CHANNEL_LAYOUT, AUDIO_SAMPLE_RATE, DEFAULT_PIXEL_FORMAT};

/// Label of the finished video stream.
pub const VIDEO_OUT: &str = "[vout]";
/// Label of the finished audio stream.
pub const AUDIO_OUT: &str = "[aout]";

/// Format a duration or offset for filter arguments.
pub fn secs(value: f64) -> String {
    format!("{:.3}", value)
}

/// Normalize input `index` to the frame size, rate and pixel format, labelled `[v{index}]`.
pub fn normalize_video(index: usize, width: u32, height: u32, fps: u32) -> String {
    format!(
        "[{i}:v]scale={w}:{h},setsar=1,fps={fps},format={pix},settb=AVTB[v{i}]",
        i = index,
        w = width,
        h = height,
        fps = fps,
        pix = DEFAULT_PIXEL_FORMAT,
    )
}

/// Chain `[v0]..[v{count-1}]` with fades into [`VIDEO_OUT`].
///
/// Segment `k` starts at `k * (segment - transition)`.
pub fn xfade_chain(count: usize, segment: f64, transition: f64) -> String {
    if count <= 1 {
        return format!("[v0]null{}", VIDEO_OUT);
    }

    let mut parts = Vec::with_capacity(count - 1);
    let mut previous = "[v0]".to_string();

    for k in 1..count {
        let offset = k as f64 * (segment - transition);
        let label = if k == count - 1 {
            VIDEO_OUT.to_string()
        } else {
            format!("[x{}]", k)
        };
        parts.push(format!(
            "{prev}[v{k}]xfade=transition=fade:duration={d}:offset={o}{label}",
            prev = previous,
            k = k,
            d = secs(transition),
            o = secs(offset),
            label = label,
        ));
        previous = label;
    }

    parts.join(";")
}

/// Hard cuts between `[v0]..[v{count-1}]` into [`VIDEO_OUT`].
pub fn concat_chain(count: usize) -> String {
    let labels: String = (0..count).map(|i| format!("[v{}]", i)).collect();
    format!("{}concat=n={}:v=1:a=0{}", labels, count, VIDEO_OUT)
}

/// Resample input `index` to the common audio format, labelled `[a{slot}]`.
pub fn normalize_audio(index: usize, slot: usize) -> String {
    format!(
        "[{i}:a]aformat=sample_fmts=fltp:sample_rates={rate}:channel_layouts={layout}[a{slot}]",
        i = index,
        rate = AUDIO_SAMPLE_RATE,
        layout = AUDIO_CHANNEL_LAYOUT,
        slot = slot,
    )
}

/// Join `[a0]..[a{count-1}]` with loop-point crossfades, labelled `[amix]`.
pub fn acrossfade_chain(count: usize, crossfade: f64) -> String {
    if count <= 1 {
        return "[a0]anull[amix]".to_string();
    }

    let mut parts = Vec::with_capacity(count - 1);
    let mut previous = "[a0]".to_string();

    for k in 1..count {
        let label = if k == count - 1 {
            "[amix]".to_string()
        } else {
            format!("[ax{}]", k)
        };
        parts.push(format!(
            "{}[a{}]acrossfade=d={}:c1=tri:c2=tri{}",
            previous,
            k,
            secs(crossfade),
            label
        ));
        previous = label;
    }

    parts.join(";")
}

/// Trim `[amix]` to `duration` and fade out over the last `fade_out` seconds into [`AUDIO_OUT`].
pub fn trim_and_fade(duration: f64, fade_out: f64) -> String {
    let mut filter = format!(
        "[amix]atrim=0:{},asetpts=PTS-STARTPTS",
        secs(duration)
    );
    if fade_out > 0.0 {
        filter.push_str(&format!(
            ",afade=t=out:st={}:d={}",
            secs((duration - fade_out).max(0.0)),
            secs(fade_out)
        ));
    }
    filter.push_str(AUDIO_OUT);
    filter
}
