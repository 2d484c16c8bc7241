//! The table of contents: per-frame metadata, per-channel offset tables,
//! and the lazily materialized channel-positions cache.
//!
//! The flat positions arrays (one `u64` per channel per frame) are the last
//! thing inside the TOC body for each payload kind.  While parsing, the
//! reader records each array's distance from end-of-file, so a later
//! consumer (in particular a stream seeded from another file's plan) can
//! seek straight to the positions without re-parsing the whole TOC.
//!
//! Channel lookups consume the flat array row by row: the first lookup of a
//! channel copies its row into a per-channel table and zeroes the row's
//! leading entry to mark it consumed, mirroring the one-shot hand-off the
//! on-disk layout is designed for.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use crate::buffer::FrameBuffer;
use crate::error::{FrameError, FrameResult};
use crate::objects::FrObject;
use crate::stream::codec::{ByteOrder, PendingSlot, SlotRefs, StructReader, StructWriter};

/// Number of TOC parses performed by this process.  Test instrumentation
/// for plan reuse: a seeded open that accepts its seed must not bump this.
pub static TOC_PARSE_COUNT: AtomicU64 = AtomicU64::new(0);

/// Current value of the TOC-parse counter.
pub fn toc_parse_count() -> u64 {
    TOC_PARSE_COUNT.load(Ordering::Relaxed)
}

// ─────────────────────────────────────────────────────────────────────────────
// Channel kinds
// ─────────────────────────────────────────────────────────────────────────────

/// The payload classes indexed by per-channel TOC tables, in on-disk table
/// order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum ChannelKind {
    Adc = 0,
    Proc = 1,
    Ser = 2,
    Sim = 3,
    SimEvent = 4,
    Event = 5,
}

pub const CHANNEL_KINDS: [ChannelKind; 6] = [
    ChannelKind::Adc,
    ChannelKind::Proc,
    ChannelKind::Ser,
    ChannelKind::Sim,
    ChannelKind::SimEvent,
    ChannelKind::Event,
];

// ─────────────────────────────────────────────────────────────────────────────
// Per-frame block
// ─────────────────────────────────────────────────────────────────────────────

/// What the TOC records about one frame.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TocFrame {
    pub frame: u32,
    pub run: i32,
    pub gtime_s: u32,
    pub gtime_n: u32,
    pub dt: f64,
    pub data_quality: u32,
    pub uleap_s: u16,
    /// Byte offset of the frame-header structure.
    pub position_h: u64,
    /// Byte offsets of the first payload of each kind within the frame;
    /// zero when the frame has none.
    pub first_adc: u64,
    pub first_ser: u64,
    pub first_msg: u64,
    pub first_table: u64,
    pub first_summary: u64,
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-channel tables
// ─────────────────────────────────────────────────────────────────────────────

/// One payload kind's channel table: names (plus ADC channel/group ids) and
/// the positions machinery.
#[derive(Debug, Clone, Default)]
pub struct TocChannelTable {
    pub names: Vec<String>,
    /// ADC only; empty for other kinds.
    pub channel_ids: Vec<u32>,
    /// ADC only; empty for other kinds.
    pub group_ids: Vec<u32>,
    /// Flat positions array, `names.len() × n_frames`, row per channel.
    positions_cache: Vec<u64>,
    /// Distance from end-of-file to the flat positions array.
    positions_cache_offset: u64,
    /// Whether `positions_cache` currently holds this file's array.
    cached: bool,
    /// Rows already handed out, by channel name.
    per_channel: HashMap<String, Vec<u64>>,
    reverse: Option<HashMap<String, usize>>,
}

impl PartialEq for TocChannelTable {
    fn eq(&self, other: &Self) -> bool {
        // Cache state is incidental; table identity is the channel lists.
        self.names == other.names
            && self.channel_ids == other.channel_ids
            && self.group_ids == other.group_ids
    }
}

impl TocChannelTable {
    fn row_of(&mut self, name: &str) -> Option<usize> {
        let reverse = self.reverse.get_or_insert_with(|| {
            self.names
                .iter()
                .enumerate()
                .map(|(i, n)| (n.clone(), i))
                .collect()
        });
        reverse.get(name).copied()
    }

    /// Re-read the flat positions array by seeking relative to end-of-file.
    /// Used after plan reuse marks the cache stale.
    fn cache_positions(
        &mut self,
        buf: &mut FrameBuffer,
        order: ByteOrder,
        n_frames: usize,
    ) -> FrameResult<()> {
        let want = self.names.len() * n_frames;
        let want_bytes = want as u64 * 8;
        if self.positions_cache_offset < want_bytes || self.positions_cache_offset > buf.size() {
            return Err(FrameError::format(
                buf.size().saturating_sub(self.positions_cache_offset),
                format!(
                    "channel positions block of {} bytes does not fit the {} bytes \
                     between its recorded location and end of file",
                    want_bytes, self.positions_cache_offset
                ),
            ));
        }
        buf.seek_from_end(self.positions_cache_offset)?;
        let mut raw = vec![0u8; want * 8];
        buf.read_exact(&mut raw)?;
        self.positions_cache = raw
            .chunks_exact(8)
            .map(|c| {
                let bytes: [u8; 8] = c.try_into().unwrap();
                match order {
                    ByteOrder::LittleEndian => u64::from_le_bytes(bytes),
                    ByteOrder::BigEndian => u64::from_be_bytes(bytes),
                }
            })
            .collect();
        self.cached = true;
        Ok(())
    }

    /// The per-frame offsets of `name`, materializing the flat array and
    /// consuming its row on first use.
    pub fn positions_for(
        &mut self,
        name: &str,
        buf: &mut FrameBuffer,
        order: ByteOrder,
        n_frames: usize,
    ) -> FrameResult<Option<&[u64]>> {
        if self.per_channel.contains_key(name) {
            return Ok(self.per_channel.get(name).map(|v| v.as_slice()));
        }
        let Some(row) = self.row_of(name) else {
            return Ok(None);
        };
        if !self.cached {
            self.cache_positions(buf, order, n_frames)?;
        }
        let start = row * n_frames;
        let positions = self.positions_cache[start..start + n_frames].to_vec();
        // Consume-mark the row: the flat array hands each row out once.
        if let Some(first) = self.positions_cache.get_mut(start) {
            *first = 0;
        }
        self.per_channel.insert(name.to_string(), positions);
        Ok(self.per_channel.get(name).map(|v| v.as_slice()))
    }

    /// Drop cached positions so the next lookup refreshes against the
    /// stream it is asked on.  Called when a plan is re-aimed at a new
    /// file.
    pub fn reset_cache(&mut self) {
        self.cached = false;
        self.positions_cache.clear();
        self.per_channel.clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FrTOC
// ─────────────────────────────────────────────────────────────────────────────

/// The parsed table of contents.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FrToc {
    pub frames: Vec<TocFrame>,
    /// Structure-header records used in the file: (class-id, name).
    pub sh_list: Vec<(i16, String)>,
    tables: [TocChannelTable; 6],
}

impl FrToc {
    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(&self, index: usize) -> Option<&TocFrame> {
        self.frames.get(index)
    }

    /// Run numbers in frame order; part of the plan-compatibility check.
    pub fn runs(&self) -> Vec<i32> {
        self.frames.iter().map(|f| f.run).collect()
    }

    pub fn table(&self, kind: ChannelKind) -> &TocChannelTable {
        &self.tables[kind as usize]
    }

    pub fn table_mut(&mut self, kind: ChannelKind) -> &mut TocChannelTable {
        &mut self.tables[kind as usize]
    }

    pub fn channel_names(&self, kind: ChannelKind) -> &[String] {
        &self.tables[kind as usize].names
    }

    /// Byte offset of channel `name` in frame `frame_index`; `None` when
    /// the TOC lists no such channel or the frame has no instance of it.
    pub fn position(
        &mut self,
        kind: ChannelKind,
        name: &str,
        frame_index: usize,
        buf: &mut FrameBuffer,
        order: ByteOrder,
    ) -> FrameResult<Option<u64>> {
        let n_frames = self.frames.len();
        if frame_index >= n_frames {
            return Ok(None);
        }
        let table = &mut self.tables[kind as usize];
        Ok(table
            .positions_for(name, buf, order, n_frames)?
            .and_then(|row| row.get(frame_index).copied())
            .filter(|&p| p != 0))
    }

    /// Flat event indexing: the `offset`-th instance of event type `name`
    /// across the whole file, counting frames that carry one.
    pub fn event_position(
        &mut self,
        kind: ChannelKind,
        name: &str,
        offset: usize,
        buf: &mut FrameBuffer,
        order: ByteOrder,
    ) -> FrameResult<Option<u64>> {
        let n_frames = self.frames.len();
        let table = &mut self.tables[kind as usize];
        let Some(row) = table.positions_for(name, buf, order, n_frames)? else {
            return Ok(None);
        };
        Ok(row.iter().filter(|&&p| p != 0).nth(offset).copied())
    }

    pub fn reset_caches(&mut self) {
        for t in &mut self.tables {
            t.reset_cache();
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder (write side)
// ─────────────────────────────────────────────────────────────────────────────

/// Accumulates TOC rows while a write stream emits structures.
#[derive(Debug, Default)]
pub struct TocBuilder {
    frames: Vec<TocFrame>,
    sh: Vec<(i16, String)>,
    /// name → (per-frame positions, channel id, group id)
    channels: [BTreeMap<String, (Vec<u64>, u32, u32)>; 6],
}

impl TocBuilder {
    pub fn new() -> Self {
        TocBuilder::default()
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn add_frame(&mut self, frame: TocFrame) {
        self.frames.push(frame);
        for table in &mut self.channels {
            for (positions, _, _) in table.values_mut() {
                positions.push(0);
            }
        }
    }

    pub fn add_sh(&mut self, class: i16, name: &str) {
        if !self.sh.iter().any(|(c, _)| *c == class) {
            self.sh.push((class, name.to_string()));
        }
    }

    /// The frame most recently added, for offset patching while its
    /// structures are being emitted.
    pub fn last_frame_mut(&mut self) -> Option<&mut TocFrame> {
        self.frames.last_mut()
    }

    /// Record the byte offset of a channel structure in the current (last
    /// added) frame.
    pub fn record_channel(
        &mut self,
        kind: ChannelKind,
        name: &str,
        offset: u64,
        channel_id: u32,
        group_id: u32,
    ) {
        let n_frames = self.frames.len();
        debug_assert!(n_frames > 0, "record_channel before any frame");
        let entry = self.channels[kind as usize]
            .entry(name.to_string())
            .or_insert_with(|| (vec![0u64; n_frames], channel_id, group_id));
        entry.0.resize(n_frames, 0);
        // First occurrence wins: the table points at the first structure of
        // a given name within each frame.
        if entry.0[n_frames - 1] == 0 {
            entry.0[n_frames - 1] = offset;
        }
    }

    pub fn build(self) -> FrToc {
        let n_frames = self.frames.len();
        let mut toc = FrToc {
            frames: self.frames,
            sh_list: self.sh,
            tables: Default::default(),
        };
        for (kind_idx, table) in self.channels.into_iter().enumerate() {
            let t = &mut toc.tables[kind_idx];
            let is_adc = kind_idx == ChannelKind::Adc as usize;
            let mut flat = Vec::new();
            for (name, (mut positions, channel_id, group_id)) in table {
                positions.resize(n_frames, 0);
                t.names.push(name.clone());
                if is_adc {
                    t.channel_ids.push(channel_id);
                    t.group_ids.push(group_id);
                }
                flat.extend_from_slice(&positions);
                t.per_channel.insert(name, positions);
            }
            t.positions_cache = flat;
            t.cached = true;
        }
        toc
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Codec
// ─────────────────────────────────────────────────────────────────────────────

pub(crate) fn decode(
    r: &mut StructReader,
    _version: u8,
) -> FrameResult<(FrObject, Vec<PendingSlot>)> {
    TOC_PARSE_COUNT.fetch_add(1, Ordering::Relaxed);
    let n_frames = r.read_u32()? as usize;
    let mut frames = vec![TocFrame::default(); n_frames];
    for f in &mut frames {
        f.frame = r.read_u32()?;
    }
    for f in &mut frames {
        f.run = r.read_i32()?;
    }
    for f in &mut frames {
        f.gtime_s = r.read_u32()?;
    }
    for f in &mut frames {
        f.gtime_n = r.read_u32()?;
    }
    for f in &mut frames {
        f.dt = r.read_f64()?;
    }
    for f in &mut frames {
        f.data_quality = r.read_u32()?;
    }
    for f in &mut frames {
        f.uleap_s = r.read_u16()?;
    }
    for f in &mut frames {
        f.position_h = r.read_u64()?;
    }
    for f in &mut frames {
        f.first_adc = r.read_u64()?;
    }
    for f in &mut frames {
        f.first_ser = r.read_u64()?;
    }
    for f in &mut frames {
        f.first_msg = r.read_u64()?;
    }
    for f in &mut frames {
        f.first_table = r.read_u64()?;
    }
    for f in &mut frames {
        f.first_summary = r.read_u64()?;
    }

    let n_sh = r.read_u32()? as usize;
    let mut sh_list = Vec::with_capacity(n_sh.min(64));
    for _ in 0..n_sh {
        let class = r.read_i16()?;
        let name = r.read_string()?;
        sh_list.push((class, name));
    }

    let mut tables: [TocChannelTable; 6] = Default::default();
    for (kind_idx, table) in tables.iter_mut().enumerate() {
        let n_channels = r.read_u32()? as usize;
        for _ in 0..n_channels {
            table.names.push(r.read_string()?);
        }
        if kind_idx == ChannelKind::Adc as usize {
            for _ in 0..n_channels {
                table.channel_ids.push(r.read_u32()?);
            }
            for _ in 0..n_channels {
                table.group_ids.push(r.read_u32()?);
            }
        }
        // The flat positions array starts here; remember its distance from
        // end-of-file so it can be re-read without re-parsing the TOC.
        if let Some(file_size) = r.file_size() {
            table.positions_cache_offset = file_size - r.offset();
        }
        let want = n_channels * n_frames;
        table.positions_cache = Vec::with_capacity(want);
        for _ in 0..want {
            table.positions_cache.push(r.read_u64()?);
        }
        table.cached = true;
    }

    Ok((
        FrObject::Toc(FrToc {
            frames,
            sh_list,
            tables,
        }),
        Vec::new(),
    ))
}

/// Read only the frame count and run numbers from a TOC body, without
/// parsing the rest (and without counting as a TOC parse).  Used by the
/// plan-compatibility check, which needs exactly these two facts.
pub(crate) fn peek_runs(r: &mut StructReader) -> FrameResult<(u32, Vec<i32>)> {
    let n_frames = r.read_u32()?;
    for _ in 0..n_frames {
        r.read_u32()?; // frame numbers
    }
    let mut runs = Vec::with_capacity(n_frames.min(4096) as usize);
    for _ in 0..n_frames {
        runs.push(r.read_i32()?);
    }
    Ok((n_frames, runs))
}

pub(crate) fn encode(
    obj: &FrObject,
    w: &mut StructWriter,
    _version: u8,
    _refs: &SlotRefs,
) -> FrameResult<()> {
    let FrObject::Toc(toc) = obj else {
        unreachable!()
    };
    let n_frames = toc.frames.len();
    w.write_u32(n_frames as u32);
    for f in &toc.frames {
        w.write_u32(f.frame);
    }
    for f in &toc.frames {
        w.write_i32(f.run);
    }
    for f in &toc.frames {
        w.write_u32(f.gtime_s);
    }
    for f in &toc.frames {
        w.write_u32(f.gtime_n);
    }
    for f in &toc.frames {
        w.write_f64(f.dt);
    }
    for f in &toc.frames {
        w.write_u32(f.data_quality);
    }
    for f in &toc.frames {
        w.write_u16(f.uleap_s);
    }
    for f in &toc.frames {
        w.write_u64(f.position_h);
    }
    for f in &toc.frames {
        w.write_u64(f.first_adc);
    }
    for f in &toc.frames {
        w.write_u64(f.first_ser);
    }
    for f in &toc.frames {
        w.write_u64(f.first_msg);
    }
    for f in &toc.frames {
        w.write_u64(f.first_table);
    }
    for f in &toc.frames {
        w.write_u64(f.first_summary);
    }

    w.write_u32(toc.sh_list.len() as u32);
    for (class, name) in &toc.sh_list {
        w.write_i16(*class);
        w.write_string(name)?;
    }

    for (kind_idx, table) in toc.tables.iter().enumerate() {
        w.write_u32(table.names.len() as u32);
        for name in &table.names {
            w.write_string(name)?;
        }
        if kind_idx == ChannelKind::Adc as usize {
            for id in &table.channel_ids {
                w.write_u32(*id);
            }
            for id in &table.group_ids {
                w.write_u32(*id);
            }
        }
        let want = table.names.len() * n_frames;
        if table.positions_cache.len() != want {
            return Err(FrameError::domain(format!(
                "TOC positions array holds {} entries, expected {}",
                table.positions_cache.len(),
                want
            )));
        }
        // Rows may be consume-marked in memory; emit the authoritative
        // per-channel copies where they exist.
        for (row, name) in table.names.iter().enumerate() {
            let start = row * n_frames;
            match table.per_channel.get(name) {
                Some(positions) => {
                    for p in positions {
                        w.write_u64(*p);
                    }
                }
                None => {
                    for p in &table.positions_cache[start..start + n_frames] {
                        w.write_u64(*p);
                    }
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_toc() -> FrToc {
        let mut b = TocBuilder::new();
        b.add_sh(3, "FrameH");
        b.add_sh(4, "FrAdcData");
        for i in 0..3u32 {
            b.add_frame(TocFrame {
                frame: i,
                run: 42,
                gtime_s: 1_000_000_000 + i,
                dt: 1.0,
                position_h: 100 + 1000 * i as u64,
                ..TocFrame::default()
            });
            b.record_channel(ChannelKind::Adc, "H1:TEST", 200 + 1000 * i as u64, 7, 1);
            if i == 1 {
                b.record_channel(ChannelKind::Event, "glitch", 500 + 1000 * i as u64, 0, 0);
            }
        }
        b.build()
    }

    #[test]
    fn builder_pads_rows_to_frame_count() {
        let toc = sample_toc();
        assert_eq!(toc.n_frames(), 3);
        let adc = toc.table(ChannelKind::Adc);
        assert_eq!(adc.names, vec!["H1:TEST".to_string()]);
        assert_eq!(adc.channel_ids, vec![7]);
        let ev = toc.table(ChannelKind::Event);
        assert_eq!(ev.per_channel["glitch"], vec![0, 1500, 0]);
    }

    #[test]
    fn codec_roundtrip_preserves_frames_and_tables() {
        let toc = sample_toc();
        let before = toc_parse_count();
        let mut w = StructWriter::new(ByteOrder::LittleEndian);
        encode(&FrObject::Toc(toc.clone()), &mut w, 8, &SlotRefs::new()).unwrap();
        let bytes = w.into_bytes();
        let mut r = StructReader::new(&bytes, ByteOrder::LittleEndian, 0);
        let (obj, _) = decode(&mut r, 8).unwrap();
        assert_eq!(r.remaining(), 0);
        let FrObject::Toc(back) = obj else {
            panic!("wrong variant")
        };
        assert_eq!(back.frames, toc.frames);
        assert_eq!(back.sh_list, toc.sh_list);
        assert_eq!(back.channel_names(ChannelKind::Adc), toc.channel_names(ChannelKind::Adc));
        assert_eq!(toc_parse_count(), before + 1);
    }

    #[test]
    fn runs_reflect_frame_order() {
        let toc = sample_toc();
        assert_eq!(toc.runs(), vec![42, 42, 42]);
    }
}
