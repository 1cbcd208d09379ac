#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerFormat {
    Mp4,
    QuickTime,
    Matroska,
    WebM,
    Avi,
    TransportStream,
    ProgramStream,
    Flv,
    Asf,
    Ogg,
    Wav,
    Mp3,
    Unknown,
}

impl ContainerFormat {
    /// MIME type for recognized containers.
    pub fn mime(self) -> Option<&'static str> {
        Some(match self {
            Self::Mp4 => "video/mp4",
            Self::QuickTime => "video/quicktime",
            Self::Matroska => "video/x-matroska",
            Self::WebM => "video/webm",
            Self::Avi => "video/x-msvideo",
            Self::TransportStream => "video/mp2t",
            Self::ProgramStream => "video/mpeg",
            Self::Flv => "video/x-flv",
            Self::Asf => "video/x-ms-asf",
            Self::Ogg => "video/ogg",
            Self::Wav => "audio/wav",
            Self::Mp3 => "audio/mpeg",
            Self::Unknown => return None,
        })
    }
}

const ASF_HEADER_GUID: [u8; 16] = [
    0x30, 0x26, 0xB2, 0x75, 0x8E, 0x66, 0xCF, 0x11, 0xA6, 0xD9, 0x00, 0xAA, 0x00, 0x62, 0xCE, 0x6C,
];

/// Detect container format from file header bytes (first few KB).
pub fn detect_container(header: &[u8]) -> ContainerFormat {
    // MP4/MOV: bytes 4..8 == "ftyp", brand at 8..12
    if header.len() >= 8 && &header[4..8] == b"ftyp" {
        if header.len() >= 12 && &header[8..12] == b"qt  " {
            return ContainerFormat::QuickTime;
        }
        return ContainerFormat::Mp4;
    }

    // Older QuickTime files start with a moov/mdat/wide atom instead of ftyp.
    if header.len() >= 8 && matches!(&header[4..8], b"moov" | b"mdat" | b"wide" | b"free") {
        return ContainerFormat::QuickTime;
    }

    // MKV/WebM: EBML magic; the DocType tells them apart.
    if header.len() >= 4 && header[0..4] == [0x1A, 0x45, 0xDF, 0xA3] {
        let doc = &header[..header.len().min(64)];
        if doc.windows(4).any(|w| w == b"webm") {
            return ContainerFormat::WebM;
        }
        return ContainerFormat::Matroska;
    }

    if header.len() >= 12 && &header[0..4] == b"RIFF" {
        match &header[8..12] {
            b"AVI " => return ContainerFormat::Avi,
            b"WAVE" => return ContainerFormat::Wav,
            _ => {}
        }
    }

    // MPEG-TS: sync byte 0x47 at offset 0 and offset 188
    if header.len() > 188 && header[0] == 0x47 && header[188] == 0x47 {
        return ContainerFormat::TransportStream;
    }

    // MPEG-PS: pack start code
    if header.len() >= 4 && header[0..4] == [0x00, 0x00, 0x01, 0xBA] {
        return ContainerFormat::ProgramStream;
    }

    if header.len() >= 4 && &header[0..3] == b"FLV" && header[3] == 0x01 {
        return ContainerFormat::Flv;
    }

    if header.len() >= 16 && header[0..16] == ASF_HEADER_GUID {
        return ContainerFormat::Asf;
    }

    if header.len() >= 4 && &header[0..4] == b"OggS" {
        return ContainerFormat::Ogg;
    }

    if has_mp3_signature(header) {
        return ContainerFormat::Mp3;
    }

    ContainerFormat::Unknown
}

/// MIME type guessed from a file extension, for inputs whose header is not recognized.
pub fn mime_from_extension(name: &str) -> Option<&'static str> {
    let (_, ext) = name.rsplit_once('.')?;
    Some(match ext.to_ascii_lowercase().as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "webm" => "video/webm",
        "avi" => "video/x-msvideo",
        "ts" | "mts" | "m2ts" => "video/mp2t",
        "mpg" | "mpeg" => "video/mpeg",
        "flv" => "video/x-flv",
        "wmv" => "video/x-ms-wmv",
        "3gp" => "video/3gpp",
        "ogv" => "video/ogg",
        _ => return None,
    })
}

pub fn is_media_mime(mime: &str) -> bool {
    let essence = mime.split(';').next().unwrap_or("").trim();
    match essence.split_once('/') {
        Some((top, sub)) => (top == "video" || top == "audio") && !sub.is_empty(),
        None => false,
    }
}

/// `true` when `data` starts with an ID3v2 tag or an MPEG audio Layer III frame header.
pub fn has_mp3_signature(data: &[u8]) -> bool {
    if data.len() >= 10 && &data[0..3] == b"ID3" && data[3] != 0xFF && data[4] != 0xFF {
        return true;
    }
    if data.len() < 4 {
        return false;
    }

    let (b0, b1, b2) = (data[0], data[1], data[2]);
    // 11-bit frame sync
    if b0 != 0xFF || b1 & 0xE0 != 0xE0 {
        return false;
    }
    let version = (b1 >> 3) & 0b11;
    let layer = (b1 >> 1) & 0b11;
    let bitrate_index = b2 >> 4;
    let sample_rate_index = (b2 >> 2) & 0b11;

    version != 0b01 && layer == 0b01 && bitrate_index != 0b1111 && sample_rate_index != 0b11
}
