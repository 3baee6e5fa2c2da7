//! decimated peak table for waveform display

use crate::{open_error, Error, FileHandler};
use embedded_io::{ReadExactError, SeekFrom};

const READER_LEN: usize = 512;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Format {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits: u16,
}

impl Format {
    /// bytes per multi-channel frame
    pub fn frame_len(&self) -> u64 {
        self.channels as u64 * (self.bits / 8) as u64
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    pub format: Format,
    /// file offset of the first pcm byte
    pub data_start: u64,
    /// pcm length in bytes
    pub data_len: u64,
}

impl Header {
    pub fn frames(&self) -> u64 {
        self.data_len / self.format.frame_len()
    }

    /// file bytes folded into each peak when analyzed for `width` columns
    pub fn peak_len(&self, width: usize) -> u64 {
        samples_per_peak(self.frames(), width) * self.format.frame_len()
    }
}

/// frames folded into each peak so `frames` fits `width` columns
pub fn samples_per_peak(frames: u64, width: usize) -> u64 {
    if width == 0 {
        1
    } else {
        (frames / width as u64).max(1)
    }
}

fn missing<E>(found_fmt: bool) -> Error<E> {
    if found_fmt {
        Error::DataNotFound
    } else {
        Error::FmtNotFound
    }
}

fn eof_as<E>(missing: Error<E>) -> impl FnOnce(ReadExactError<E>) -> Error<E> {
    move |e| match e {
        ReadExactError::UnexpectedEof => missing,
        ReadExactError::Other(e) => Error::Other(e),
    }
}

/// Parse the RIFF/WAVE header, leaving `file` positioned on the first pcm byte.
pub fn read_header<F: FileHandler>(
    fs: &mut F,
    file: &mut F::File,
) -> Result<Header, Error<F::Error>> {
    fs.seek(file, SeekFrom::Start(0)).map_err(Error::Other)?;
    let mut id = [0u8; 4];
    let mut size = [0u8; 4];
    fs.read_exact(file, &mut id)
        .map_err(eof_as(Error::BadFormat))?;
    if &id != b"RIFF" {
        return Err(Error::BadFormat);
    }
    fs.read_exact(file, &mut size)
        .map_err(eof_as(Error::BadFormat))?;
    fs.read_exact(file, &mut id)
        .map_err(eof_as(Error::BadFormat))?;
    if &id != b"WAVE" {
        return Err(Error::BadFormat);
    }

    let mut format: Option<Format> = None;
    loop {
        fs.read_exact(file, &mut id)
            .map_err(eof_as(missing(format.is_some())))?;
        fs.read_exact(file, &mut size)
            .map_err(eof_as(missing(format.is_some())))?;
        let chunk_len = u32::from_le_bytes(size) as u64;
        match &id {
            b"fmt " => {
                if chunk_len < 16 {
                    return Err(Error::BadFormat);
                }
                let mut fmt = [0u8; 16];
                fs.read_exact(file, &mut fmt)
                    .map_err(eof_as(Error::FmtNotFound))?;
                format = Some(Format {
                    channels: u16::from_le_bytes([fmt[2], fmt[3]]),
                    sample_rate: u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]),
                    bits: u16::from_le_bytes([fmt[14], fmt[15]]),
                });
                let rest = (chunk_len - 16 + (chunk_len & 1)) as i64;
                fs.seek(file, SeekFrom::Current(rest))
                    .map_err(|_| Error::DataNotFound)?;
            }
            b"data" => {
                let format = format.ok_or(Error::FmtNotFound)?;
                if format.channels == 0 {
                    return Err(Error::BadFormat);
                }
                if format.bits != 8 && format.bits != 16 {
                    return Err(Error::UnsupportedDepth(format.bits));
                }
                let data_start = fs.stream_position(file).map_err(Error::Other)?;
                return Ok(Header {
                    format,
                    data_start,
                    data_len: chunk_len,
                });
            }
            _ => {
                // chunks are word aligned
                let rest = (chunk_len + (chunk_len & 1)) as i64;
                fs.seek(file, SeekFrom::Current(rest))
                    .map_err(|_| missing(format.is_some()))?;
            }
        }
    }
}

struct BufReader<'a, F: FileHandler> {
    fs: &'a mut F,
    file: &'a mut F::File,
    buffer: [u8; READER_LEN],
    index: usize,
    /// valid bytes in `buffer`
    len: usize,
    /// bytes left to pull from storage
    rem: u64,
}

impl<'a, F: FileHandler> BufReader<'a, F> {
    fn new(fs: &'a mut F, file: &'a mut F::File, rem: u64) -> Self {
        Self {
            fs,
            file,
            buffer: [0; READER_LEN],
            index: 0,
            len: 0,
            rem,
        }
    }

    /// read the next byte, returns None at the end of the data
    fn next(&mut self) -> Result<Option<u8>, Error<F::Error>> {
        if self.index >= self.len {
            if self.rem == 0 {
                return Ok(None);
            }
            // refill buffer
            let want = self.rem.min(READER_LEN as u64) as usize;
            self.index = 0;
            self.len = 0;
            let mut slice = &mut self.buffer[..want];
            while !slice.is_empty() {
                let n = self.fs.read(self.file, slice).map_err(Error::Other)?;
                if n == 0 {
                    break; // reached EOF, keep partially filled buffer
                }
                slice = &mut slice[n..];
                self.len += n;
            }
            if self.len == 0 {
                self.rem = 0;
                return Ok(None);
            }
            self.rem -= self.len as u64;
        }
        let byte = self.buffer[self.index];
        self.index += 1;
        Ok(Some(byte))
    }

    /// discard `n` bytes; false if the data ran out first
    fn skip(&mut self, n: usize) -> Result<bool, Error<F::Error>> {
        for _ in 0..n {
            if self.next()?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// magnitude of the next sample, 8-bit rescaled to the 16-bit range
    fn magnitude(&mut self, bits: u16) -> Result<Option<u16>, Error<F::Error>> {
        if bits == 8 {
            let Some(byte) = self.next()? else {
                return Ok(None);
            };
            Ok(Some(((byte as i16 - 128) * 256).unsigned_abs()))
        } else {
            let (Some(lo), Some(hi)) = (self.next()?, self.next()?) else {
                return Ok(None);
            };
            Ok(Some(i16::from_le_bytes([lo, hi]).unsigned_abs()))
        }
    }
}

/// Fill `peaks` from an open file, one entry per `samples_per_peak` frames of the first channel.
///
/// Returns the number of peaks written.
pub fn analyze_file<F: FileHandler>(
    fs: &mut F,
    file: &mut F::File,
    width: usize,
    peaks: &mut [u16],
) -> Result<usize, Error<F::Error>> {
    let header = read_header(fs, file)?;
    decimate(fs, file, &header, width, peaks)
}

/// fold the pcm after `header` into peaks; `file` must sit on the first pcm byte
fn decimate<F: FileHandler>(
    fs: &mut F,
    file: &mut F::File,
    header: &Header,
    width: usize,
    peaks: &mut [u16],
) -> Result<usize, Error<F::Error>> {
    let frames = header.frames();
    let per_peak = samples_per_peak(frames, width);
    let skip_len = (header.format.bits / 8) as usize * (header.format.channels as usize - 1);
    debug!(
        "{} channels, {} hz, {} bits, {} frames, {} per peak",
        header.format.channels,
        header.format.sample_rate,
        header.format.bits,
        frames,
        per_peak
    );

    let mut reader = BufReader::new(fs, file, header.data_len);
    let mut count = 0;
    let mut span = 0;
    let mut max = 0u16;
    for _ in 0..frames {
        if count >= peaks.len() {
            break;
        }
        let Some(magnitude) = reader.magnitude(header.format.bits)? else {
            break;
        };
        // keep frame alignment across the other channels
        if !reader.skip(skip_len)? {
            break;
        }
        max = max.max(magnitude);
        span += 1;
        if span >= per_peak {
            peaks[count] = max;
            count += 1;
            max = 0;
            span = 0;
        }
    }
    if span > 0 && count < peaks.len() {
        peaks[count] = max;
        count += 1;
    }
    debug!("{} peaks", count);
    Ok(count)
}

/// [`analyze_file`] on the file at `path`; the file is closed again on every path.
pub fn analyze<F: FileHandler>(
    fs: &mut F,
    path: &str,
    width: usize,
    peaks: &mut [u16],
) -> Result<usize, Error<F::Error>> {
    analyze_with_header(fs, path, width, peaks).map(|(_, count)| count)
}

/// [`analyze`], also handing back the parsed header so callers can map file positions onto peaks.
pub fn analyze_with_header<F: FileHandler>(
    fs: &mut F,
    path: &str,
    width: usize,
    peaks: &mut [u16],
) -> Result<(Header, usize), Error<F::Error>> {
    let mut file = fs.open(path).map_err(open_error)?;
    let res = match read_header(fs, &mut file) {
        Ok(header) => decimate(fs, &mut file, &header, width, peaks).map(|count| (header, count)),
        Err(e) => Err(e),
    };
    if fs.close(file).is_err() {
        warn!("close {} failed", path);
    }
    res
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{wav, MemFs};

    fn chunk(id: &[u8; 4], body: &[u8]) -> Vec<u8> {
        let mut bytes = id.to_vec();
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(body);
        if body.len() % 2 == 1 {
            bytes.push(0);
        }
        bytes
    }

    fn riff(chunks: &[Vec<u8>]) -> Vec<u8> {
        let body: Vec<u8> = chunks.concat();
        let mut bytes = b"RIFF".to_vec();
        bytes.extend_from_slice(&(4 + body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend(body);
        bytes
    }

    fn fmt(channels: u16, bits: u16) -> Vec<u8> {
        let mut body = 1u16.to_le_bytes().to_vec();
        body.extend_from_slice(&channels.to_le_bytes());
        body.extend_from_slice(&44_100u32.to_le_bytes());
        body.extend_from_slice(&(44_100u32 * (channels * bits / 8) as u32).to_le_bytes());
        body.extend_from_slice(&(channels * bits / 8).to_le_bytes());
        body.extend_from_slice(&bits.to_le_bytes());
        chunk(b"fmt ", &body)
    }

    fn constant16(frames: usize, value: i16) -> Vec<u8> {
        (0..frames).flat_map(|_| value.to_le_bytes()).collect()
    }

    #[test]
    fn constant_magnitude_round_trip() {
        let mut fs = MemFs::with("a.wav", wav(1, 44_100, 16, &constant16(1000, -1200)));
        let mut peaks = [0u16; 400];
        let count = analyze(&mut fs, "a.wav", 300, &mut peaks).unwrap();
        // 1000 frames / 300 columns = 3 frames per peak
        assert_eq!(count, 1000usize.div_ceil(3));
        assert!(peaks[..count].iter().all(|v| *v == 1200));
        assert!(peaks[count..].iter().all(|v| *v == 0));
    }

    #[test]
    fn tracks_max_within_each_span() {
        let pcm: Vec<u8> = (0..8i16).flat_map(|v| (v * 100).to_le_bytes()).collect();
        let mut fs = MemFs::with("a.wav", wav(1, 44_100, 16, &pcm));
        let mut peaks = [0u16; 8];
        let count = analyze(&mut fs, "a.wav", 2, &mut peaks).unwrap();
        assert_eq!(&peaks[..count], &[300, 700]);
    }

    #[test]
    fn eight_bit_stereo_reads_first_channel() {
        // left 192 -> 64 * 256, right silent
        let pcm: Vec<u8> = (0..10).flat_map(|_| [192u8, 128u8]).collect();
        let mut fs = MemFs::with("a.wav", wav(2, 22_050, 8, &pcm));
        let mut peaks = [0u16; 16];
        let count = analyze(&mut fs, "a.wav", 5, &mut peaks).unwrap();
        assert_eq!(count, 5);
        assert!(peaks[..count].iter().all(|v| *v == 64 * 256));
    }

    #[test]
    fn stereo_sixteen_bit_ignores_right() {
        let pcm: Vec<u8> = (0..6)
            .flat_map(|_| [500i16.to_le_bytes(), i16::MIN.to_le_bytes()].concat())
            .collect();
        let mut fs = MemFs::with("a.wav", wav(2, 44_100, 16, &pcm));
        let mut peaks = [0u16; 16];
        let count = analyze(&mut fs, "a.wav", 3, &mut peaks).unwrap();
        assert_eq!(&peaks[..count], &[500, 500, 500]);
    }

    #[test]
    fn full_scale_negative_does_not_overflow() {
        let mut fs = MemFs::with("a.wav", wav(1, 44_100, 16, &constant16(4, i16::MIN)));
        let mut peaks = [0u16; 4];
        let count = analyze(&mut fs, "a.wav", 4, &mut peaks).unwrap();
        assert_eq!(&peaks[..count], &[32768; 4]);
    }

    #[test]
    fn stops_at_capacity() {
        let mut fs = MemFs::with("a.wav", wav(1, 44_100, 16, &constant16(1000, 10)));
        let mut peaks = [0u16; 10];
        assert_eq!(analyze(&mut fs, "a.wav", 500, &mut peaks).unwrap(), 10);
    }

    #[test]
    fn header_maps_file_bytes_onto_peaks() {
        // 1.5 frames per column folds to one, so capacity cuts the table short
        let mut fs = MemFs::with("a.wav", wav(2, 44_100, 16, &[0; 450 * 4]));
        let mut peaks = [0u16; 300];
        let (header, count) = analyze_with_header(&mut fs, "a.wav", 300, &mut peaks).unwrap();
        assert_eq!(count, 300);
        assert_eq!(header.data_start, 44);
        assert_eq!(header.frames(), 450);
        assert_eq!(header.peak_len(300), 4);
        assert_eq!(header.peak_len(100), 16);
    }

    #[test]
    fn fewer_frames_than_columns() {
        assert_eq!(samples_per_peak(100, 280), 1);
        assert_eq!(samples_per_peak(0, 280), 1);
        assert_eq!(samples_per_peak(2800, 280), 10);
        assert_eq!(samples_per_peak(2800, 0), 1);
    }

    #[test]
    fn truncated_data_keeps_partial_span() {
        // data chunk claims more than the file holds
        let mut bytes = wav(1, 44_100, 16, &constant16(4, 42));
        assert_eq!(bytes.len(), 52);
        bytes[40..44].copy_from_slice(&100u32.to_le_bytes());
        let mut fs = MemFs::with("a.wav", bytes);
        let mut peaks = [0u16; 8];
        let count = analyze(&mut fs, "a.wav", 10, &mut peaks).unwrap();
        // 50 frames claimed, 10 columns -> 5 per peak, only 4 frames present
        assert_eq!(&peaks[..count], &[42]);
    }

    #[test]
    fn header_fields() {
        let bytes = riff(&[
            chunk(b"LIST", b"abc"),
            fmt(2, 16),
            chunk(b"data", &[0; 8]),
        ]);
        let mut fs = MemFs::with("a.wav", bytes);
        let mut file = fs.open("a.wav").unwrap();
        let header = read_header(&mut fs, &mut file).unwrap();
        assert_eq!(
            header.format,
            Format {
                channels: 2,
                sample_rate: 44_100,
                bits: 16
            }
        );
        // 12 riff + 12 list (odd body padded) + 24 fmt + 8 data header
        assert_eq!(header.data_start, 56);
        assert_eq!(header.data_len, 8);
        assert_eq!(header.frames(), 2);
    }

    #[test]
    fn missing_data_is_a_format_error() {
        let mut fs = MemFs::with("a.wav", riff(&[fmt(1, 16)]));
        let mut peaks = [0u16; 8];
        let res = analyze(&mut fs, "a.wav", 8, &mut peaks);
        assert_eq!(res, Err(Error::DataNotFound));
        assert!(res.as_ref().is_err_and(|e| e.is_format()));
        assert_eq!(res.unwrap_or(0), 0);
    }

    #[test]
    fn missing_fmt_is_a_format_error() {
        let mut fs = MemFs::with("a.wav", riff(&[chunk(b"data", &[0; 8])]));
        let mut peaks = [0u16; 8];
        assert_eq!(
            analyze(&mut fs, "a.wav", 8, &mut peaks),
            Err(Error::FmtNotFound)
        );
    }

    #[test]
    fn rejects_foreign_containers() {
        let mut bytes = riff(&[fmt(1, 16), chunk(b"data", &[0; 8])]);
        bytes[8..12].copy_from_slice(b"AVI ");
        let mut fs = MemFs::with("a.wav", bytes);
        fs.files.insert("b.raw".into(), vec![0; 64]);
        let mut peaks = [0u16; 8];
        assert_eq!(
            analyze(&mut fs, "a.wav", 8, &mut peaks),
            Err(Error::BadFormat)
        );
        assert_eq!(
            analyze(&mut fs, "b.raw", 8, &mut peaks),
            Err(Error::BadFormat)
        );
    }

    #[test]
    fn rejects_unsupported_depth() {
        let mut fs = MemFs::with("a.wav", riff(&[fmt(1, 24), chunk(b"data", &[0; 6])]));
        let mut peaks = [0u16; 8];
        assert_eq!(
            analyze(&mut fs, "a.wav", 8, &mut peaks),
            Err(Error::UnsupportedDepth(24))
        );
    }

    #[test]
    fn missing_file() {
        let mut fs = MemFs::default();
        let mut peaks = [0u16; 8];
        assert_eq!(
            analyze(&mut fs, "a.wav", 8, &mut peaks),
            Err(Error::NotFound)
        );
    }
}
