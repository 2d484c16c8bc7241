//! Write-side frame stream.
//!
//! Structures go to the file in topological order: a frame header first
//! (its reference slots filled with instance ids allocated ahead of time),
//! then the objects those references target, so that on read the resolver
//! meets every holder before its targets and a TOC-directed seek can read a
//! channel cluster by scanning forward.
//!
//! Instance ids increase monotonically per class; the byte offset of every
//! channel structure feeds the TOC builder as it is written.  `close`
//! emits the TOC, then the end-of-file record carrying the TOC offset and
//! the whole-file checksum accumulated by the stream's CRC filter.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use crate::buffer::FrameBuffer;
use crate::checksum::{crc32, Crc32Filter, Crc32Handle, FILE_CRC_FILTER};
use crate::error::{FrameError, FrameResult};
use crate::filter::StreamFilter;
use crate::objects::schema::description_of;
use crate::objects::{
    frameh, ClassId, FrAdcData, FrDetector, FrEvent, FrHistory, FrMsg, FrObject, FrProcData,
    FrRawData, FrSerData, FrSimData, FrSimEvent, FrStatData, FrSummary, FrTable, FrVect,
    FrEndOfFrame, FrameH,
};
use crate::objects::channel::{adc_slot, proc_slot, ser_slot, sim_slot};
use crate::objects::event::event_slot;
use crate::objects::meta::{detector_slot, raw_slot, stat_slot, summary_slot, table_slot};
use crate::prefs::StreamPrefs;
use crate::spec::{self, has_struct_checksum, FRAME_SPEC_CURRENT};
use crate::stream::codec::{ByteOrder, RawRef, SlotRefs, StructWriter, SLOT_NEXT};
use crate::stream::header::FileHeader;
use crate::stream::{end_of_file_struct_len, STRUCT_HEAD_BYTES};
use crate::toc::{ChannelKind, TocBuilder, TocFrame};

const C_SH: i16 = ClassId::Sh as i16;
const C_SE: i16 = ClassId::Se as i16;
const C_FRAMEH: i16 = ClassId::FrameH as i16;
const C_ADC: i16 = ClassId::AdcData as i16;
const C_DETECTOR: i16 = ClassId::Detector as i16;
const C_EOF: i16 = ClassId::EndOfFile as i16;
const C_EOFR: i16 = ClassId::EndOfFrame as i16;
const C_EVENT: i16 = ClassId::Event as i16;
const C_HISTORY: i16 = ClassId::History as i16;
const C_MSG: i16 = ClassId::Msg as i16;
const C_PROC: i16 = ClassId::ProcData as i16;
const C_RAW: i16 = ClassId::RawData as i16;
const C_SER: i16 = ClassId::SerData as i16;
const C_SIM: i16 = ClassId::SimData as i16;
const C_SIMEVENT: i16 = ClassId::SimEvent as i16;
const C_STAT: i16 = ClassId::StatData as i16;
const C_SUMMARY: i16 = ClassId::Summary as i16;
const C_TABLE: i16 = ClassId::Table as i16;
const C_TOC: i16 = ClassId::Toc as i16;
const C_VECT: i16 = ClassId::Vect as i16;

/// Which first-payload offset of the current TOC frame row to fill.
#[derive(Clone, Copy)]
enum FirstOffset {
    Adc,
    Ser,
    Msg,
    Table,
    Summary,
}

pub struct OFrameStream {
    buf: FrameBuffer,
    order: ByteOrder,
    version: u8,
    file_crc: Crc32Handle,
    counters: HashMap<i16, u32>,
    toc: TocBuilder,
    described: HashSet<i16>,
    last_run_frame: Option<(i32, u32)>,
    errored: bool,
    finished: bool,
}

impl OFrameStream {
    /// Create a frame file at `path`, writing its header immediately.
    pub fn create(path: &Path, prefs: &StreamPrefs) -> FrameResult<Self> {
        spec::initialize();
        if !spec::is_supported(prefs.output_version) {
            return Err(FrameError::Unimplemented {
                version: prefs.output_version,
                what: "data-format version",
            });
        }
        let order = prefs.output_order.unwrap_or_else(ByteOrder::host);
        let mut buf = FrameBuffer::create_write(path, prefs)?;
        let (filter, file_crc) = Crc32Filter::new(FILE_CRC_FILTER);
        buf.add_filter(Box::new(filter))?;
        let header = FileHeader::new(prefs.output_version, &crate::library_name(), order);
        buf.write_all(&header.encode()?)?;
        Ok(OFrameStream {
            buf,
            order,
            version: prefs.output_version,
            file_crc,
            counters: HashMap::new(),
            toc: TocBuilder::new(),
            described: HashSet::new(),
            last_run_frame: None,
            errored: false,
            finished: false,
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn endianness(&self) -> ByteOrder {
        self.order
    }

    pub fn word_sizes(&self) -> crate::stream::codec::WordSizes {
        crate::stream::codec::WordSizes::STANDARD
    }

    pub fn tell(&self) -> u64 {
        self.buf.tell()
    }

    /// Write streams are append-only; any seek away from the current
    /// position is refused once emission has begun.
    pub fn seek(&mut self, offset: u64) -> FrameResult<()> {
        self.buf.seek(offset)
    }

    /// Install a streaming filter at the current write position.
    pub fn add_filter(&mut self, filter: Box<dyn StreamFilter>) -> FrameResult<()> {
        self.buf.add_filter(filter)
    }

    /// Uninstall a filter, flushing its pending tail window first.
    pub fn remove_filter(&mut self, name: &str) -> Option<Box<dyn StreamFilter>> {
        self.buf.remove_filter(name)
    }

    pub fn bytes_filtered(&self) -> u64 {
        self.buf.bytes_filtered()
    }

    fn guard(&self) -> FrameResult<()> {
        if self.errored {
            return Err(FrameError::domain("stream is errored; no further writes"));
        }
        if self.finished {
            return Err(FrameError::domain("stream is closed; no further writes"));
        }
        Ok(())
    }

    fn alloc(&mut self, class: i16) -> u32 {
        let counter = self.counters.entry(class).or_insert(0);
        *counter += 1;
        *counter
    }

    fn alloc_chain(&mut self, class: i16, n: usize) -> Vec<u32> {
        (0..n).map(|_| self.alloc(class)).collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Structure framing
    // ─────────────────────────────────────────────────────────────────────

    /// Emit one length-prefixed structure.  `body_fn` runs against a
    /// writer for the body; the length field is patched in front of it and
    /// the trailing CRC (at versions that carry one) appended.  Returns the
    /// structure's byte offset.
    pub fn write_structure(
        &mut self,
        class: i16,
        instance: u32,
        body_fn: impl FnOnce(&mut StructWriter) -> FrameResult<()>,
    ) -> FrameResult<u64> {
        self.guard()?;
        let start = self.buf.tell();
        let mut body = StructWriter::new(self.order);
        body_fn(&mut body)?;
        let with_crc = has_struct_checksum(self.version);
        let total = STRUCT_HEAD_BYTES + body.len() as u64 + if with_crc { 4 } else { 0 };
        let mut image = StructWriter::new(self.order);
        image.write_u64(total);
        image.write_i16(class);
        image.write_u32(instance);
        image.write_bytes(body.as_bytes());
        if with_crc {
            let crc = crc32(image.as_bytes());
            image.write_u32(crc);
        }
        if let Err(e) = self.buf.write_all(image.as_bytes()) {
            self.errored = true;
            return Err(e);
        }
        Ok(start)
    }

    fn emit_object(&mut self, obj: &FrObject, instance: u32, refs: &SlotRefs) -> FrameResult<u64> {
        let class = obj.class_id() as i16;
        self.ensure_described(obj.class_id())?;
        let registry = spec::registry_for(self.version).expect("version checked at create");
        let entry = registry.entry(class).ok_or(FrameError::Schema {
            version: self.version,
            class,
            offset: self.buf.tell(),
            what: "class not present in output version registry".into(),
        })?;
        let encode = entry.encode;
        let version = self.version;
        self.write_structure(class, instance, |w| encode(obj, w, version, refs))
    }

    /// Emit the FrSH/FrSE description of `class` the first time a structure
    /// of that class appears in the file.
    fn ensure_described(&mut self, class: ClassId) -> FrameResult<()> {
        if class == ClassId::Sh || class == ClassId::Se {
            return Ok(());
        }
        if !self.described.insert(class as i16) {
            return Ok(());
        }
        self.toc.add_sh(class as i16, class.struct_name());
        let sh_id = self.alloc(C_SH);
        let name = class.struct_name();
        let class_num = class as i16;
        self.write_structure(C_SH, sh_id, |w| {
            w.write_string(name)?;
            w.write_i16(class_num);
            w.write_string("")?;
            Ok(())
        })?;
        if let Some(desc) = description_of(class) {
            for element in &desc.elements {
                let se_id = self.alloc(C_SE);
                self.write_structure(C_SE, se_id, |w| {
                    w.write_string(&element.name)?;
                    w.write_string(&element.class_type)?;
                    w.write_string(&element.comment)?;
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Frame emission
    // ─────────────────────────────────────────────────────────────────────

    /// Demote `frame` to the stream's output version and write its whole
    /// object tree as one frame.
    pub fn write_frame(&mut self, frame: &FrameH) -> FrameResult<()> {
        self.guard()?;
        if let Some((run, num)) = self.last_run_frame {
            if frame.run == run && frame.frame <= num {
                return Err(FrameError::domain(format!(
                    "frame numbers must increase within run {}: {} follows {}",
                    run, frame.frame, num
                )));
            }
        }
        let demoted = spec::demote(
            FrObject::FrameH(frame.clone()),
            FRAME_SPEC_CURRENT,
            self.version,
        )?;
        let FrObject::FrameH(h) = demoted else {
            unreachable!()
        };
        self.emit_frame(h)?;
        self.last_run_frame = Some((frame.run, frame.frame));
        Ok(())
    }

    fn emit_frame(&mut self, mut h: FrameH) -> FrameResult<()> {
        let run = h.run;
        let frame_num = h.frame;
        let gtime = h.gtime;

        // Detach the children; the header structure is written first, its
        // reference slots filled with ids allocated here.
        let type_ = h.type_.take();
        let user = h.user.take();
        let detect_sim = h.detect_sim.take();
        let detect_proc = h.detect_proc.take();
        let history = std::mem::take(&mut h.history);
        let raw = h.raw_data.take();
        let proc = std::mem::take(&mut h.proc_data);
        let sim = std::mem::take(&mut h.sim_data);
        let events = std::mem::take(&mut h.events);
        let sim_events = std::mem::take(&mut h.sim_events);
        let summaries = std::mem::take(&mut h.summaries);
        let aux_data = h.aux_data.take();
        let aux_table = h.aux_table.take();

        let h_id = self.alloc(C_FRAMEH);
        let mut refs = SlotRefs::new();
        let type_id = self.ref_for(&mut refs, frameh::slot::TYPE, C_VECT, type_.is_some());
        let user_id = self.ref_for(&mut refs, frameh::slot::USER, C_VECT, user.is_some());
        let dsim_id = self.ref_for(
            &mut refs,
            frameh::slot::DETECT_SIM,
            C_DETECTOR,
            detect_sim.is_some(),
        );
        let dproc_id = self.ref_for(
            &mut refs,
            frameh::slot::DETECT_PROC,
            C_DETECTOR,
            detect_proc.is_some(),
        );
        let history_ids = self.chain_for(&mut refs, frameh::slot::HISTORY, C_HISTORY, history.len());
        let raw_id = self.ref_for(&mut refs, frameh::slot::RAW_DATA, C_RAW, raw.is_some());
        let proc_ids = self.chain_for(&mut refs, frameh::slot::PROC_DATA, C_PROC, proc.len());
        let sim_ids = self.chain_for(&mut refs, frameh::slot::SIM_DATA, C_SIM, sim.len());
        let event_ids = self.chain_for(&mut refs, frameh::slot::EVENT, C_EVENT, events.len());
        let sev_ids =
            self.chain_for(&mut refs, frameh::slot::SIM_EVENT, C_SIMEVENT, sim_events.len());
        let summary_ids =
            self.chain_for(&mut refs, frameh::slot::SUMMARY, C_SUMMARY, summaries.len());
        let auxd_id = self.ref_for(&mut refs, frameh::slot::AUX_DATA, C_VECT, aux_data.is_some());
        let auxt_id =
            self.ref_for(&mut refs, frameh::slot::AUX_TABLE, C_TABLE, aux_table.is_some());

        self.toc.add_frame(TocFrame {
            frame: frame_num,
            run,
            gtime_s: gtime.seconds,
            gtime_n: gtime.nanoseconds,
            dt: h.dt,
            data_quality: h.data_quality,
            uleap_s: h.uleap_s,
            ..TocFrame::default()
        });

        let obj = FrObject::FrameH(h);
        let position_h = self.emit_object(&obj, h_id, &refs)?;
        if let Some(f) = self.toc.last_frame_mut() {
            f.position_h = position_h;
        }

        if let (Some(v), Some(id)) = (type_, type_id) {
            self.emit_vect(*v, id, RawRef::NULL)?;
        }
        if let (Some(v), Some(id)) = (user, user_id) {
            self.emit_vect(*v, id, RawRef::NULL)?;
        }
        if let (Some(d), Some(id)) = (detect_sim, dsim_id) {
            self.emit_detector(*d, id, RawRef::NULL)?;
        }
        if let (Some(d), Some(id)) = (detect_proc, dproc_id) {
            self.emit_detector(*d, id, RawRef::NULL)?;
        }
        self.emit_history_chain(history, &history_ids)?;
        if let (Some(r), Some(id)) = (raw, raw_id) {
            self.emit_raw_data(*r, id)?;
        }
        self.emit_proc_chain(proc, &proc_ids)?;
        self.emit_sim_chain(sim, &sim_ids)?;
        self.emit_event_chain(events, &event_ids)?;
        self.emit_sim_event_chain(sim_events, &sev_ids)?;
        self.emit_summary_chain(summaries, &summary_ids)?;
        if let (Some(v), Some(id)) = (aux_data, auxd_id) {
            self.emit_vect(*v, id, RawRef::NULL)?;
        }
        if let (Some(t), Some(id)) = (aux_table, auxt_id) {
            let off = self.emit_table(*t, id, RawRef::NULL)?;
            self.note_first(FirstOffset::Table, off);
        }

        let eofr_id = self.alloc(C_EOFR);
        let eofr = FrObject::EndOfFrame(FrEndOfFrame {
            run,
            frame: frame_num,
            gtime_s: gtime.seconds,
            gtime_n: gtime.nanoseconds,
        });
        self.emit_object(&eofr, eofr_id, &SlotRefs::new())?;
        Ok(())
    }

    fn ref_for(&mut self, refs: &mut SlotRefs, slot: u8, class: i16, present: bool) -> Option<u32> {
        if !present {
            return None;
        }
        let id = self.alloc(class);
        refs.set(slot, RawRef::new(class, id));
        Some(id)
    }

    fn chain_for(&mut self, refs: &mut SlotRefs, slot: u8, class: i16, n: usize) -> Vec<u32> {
        let ids = self.alloc_chain(class, n);
        if let Some(&first) = ids.first() {
            refs.set(slot, RawRef::new(class, first));
        }
        ids
    }

    fn note_first(&mut self, kind: FirstOffset, offset: u64) {
        if let Some(f) = self.toc.last_frame_mut() {
            let cell = match kind {
                FirstOffset::Adc => &mut f.first_adc,
                FirstOffset::Ser => &mut f.first_ser,
                FirstOffset::Msg => &mut f.first_msg,
                FirstOffset::Table => &mut f.first_table,
                FirstOffset::Summary => &mut f.first_summary,
            };
            if *cell == 0 {
                *cell = offset;
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Per-class emitters
    // ─────────────────────────────────────────────────────────────────────

    fn emit_vect(&mut self, v: FrVect, id: u32, next: RawRef) -> FrameResult<u64> {
        let mut refs = SlotRefs::new();
        refs.set(SLOT_NEXT, next);
        self.emit_object(&FrObject::Vect(v), id, &refs)
    }

    fn emit_vect_chain(&mut self, items: Vec<FrVect>, ids: &[u32]) -> FrameResult<()> {
        for (i, v) in items.into_iter().enumerate() {
            let next = ids
                .get(i + 1)
                .map(|&n| RawRef::new(C_VECT, n))
                .unwrap_or(RawRef::NULL);
            self.emit_vect(v, ids[i], next)?;
        }
        Ok(())
    }

    fn emit_adc(&mut self, mut adc: FrAdcData, id: u32, next: RawRef) -> FrameResult<u64> {
        let name = adc.name.clone();
        let group = adc.channel_group;
        let number = adc.channel_number;
        let data = adc.data.take();
        let aux = adc.aux.take();
        let mut refs = SlotRefs::new();
        refs.set(SLOT_NEXT, next);
        let data_id = data
            .as_ref()
            .map(|_| self.alloc(C_VECT))
            .inspect(|&i| refs.set(adc_slot::DATA, RawRef::new(C_VECT, i)));
        let aux_id = aux
            .as_ref()
            .map(|_| self.alloc(C_VECT))
            .inspect(|&i| refs.set(adc_slot::AUX, RawRef::new(C_VECT, i)));
        let offset = self.emit_object(&FrObject::AdcData(adc), id, &refs)?;
        self.toc
            .record_channel(ChannelKind::Adc, &name, offset, number, group);
        self.note_first(FirstOffset::Adc, offset);
        if let (Some(v), Some(vid)) = (data, data_id) {
            self.emit_vect(*v, vid, RawRef::NULL)?;
        }
        if let (Some(v), Some(vid)) = (aux, aux_id) {
            self.emit_vect(*v, vid, RawRef::NULL)?;
        }
        Ok(offset)
    }

    fn emit_proc(&mut self, mut p: FrProcData, id: u32, next: RawRef) -> FrameResult<u64> {
        let name = p.name.clone();
        let data = p.data.take();
        let aux = p.aux.take();
        let mut refs = SlotRefs::new();
        refs.set(SLOT_NEXT, next);
        let data_id = data
            .as_ref()
            .map(|_| self.alloc(C_VECT))
            .inspect(|&i| refs.set(proc_slot::DATA, RawRef::new(C_VECT, i)));
        let aux_id = aux
            .as_ref()
            .map(|_| self.alloc(C_VECT))
            .inspect(|&i| refs.set(proc_slot::AUX, RawRef::new(C_VECT, i)));
        let offset = self.emit_object(&FrObject::ProcData(p), id, &refs)?;
        self.toc
            .record_channel(ChannelKind::Proc, &name, offset, 0, 0);
        if let (Some(v), Some(vid)) = (data, data_id) {
            self.emit_vect(*v, vid, RawRef::NULL)?;
        }
        if let (Some(v), Some(vid)) = (aux, aux_id) {
            self.emit_vect(*v, vid, RawRef::NULL)?;
        }
        Ok(offset)
    }

    fn emit_ser(&mut self, mut s: FrSerData, id: u32, next: RawRef) -> FrameResult<u64> {
        let name = s.name.clone();
        let serial = s.serial.take();
        let mut refs = SlotRefs::new();
        refs.set(SLOT_NEXT, next);
        let serial_id = serial
            .as_ref()
            .map(|_| self.alloc(C_VECT))
            .inspect(|&i| refs.set(ser_slot::SERIAL, RawRef::new(C_VECT, i)));
        let offset = self.emit_object(&FrObject::SerData(s), id, &refs)?;
        self.toc.record_channel(ChannelKind::Ser, &name, offset, 0, 0);
        self.note_first(FirstOffset::Ser, offset);
        if let (Some(v), Some(vid)) = (serial, serial_id) {
            self.emit_vect(*v, vid, RawRef::NULL)?;
        }
        Ok(offset)
    }

    fn emit_sim(&mut self, mut s: FrSimData, id: u32, next: RawRef) -> FrameResult<u64> {
        let name = s.name.clone();
        let data = s.data.take();
        let input = s.input.take();
        let mut refs = SlotRefs::new();
        refs.set(SLOT_NEXT, next);
        let data_id = data
            .as_ref()
            .map(|_| self.alloc(C_VECT))
            .inspect(|&i| refs.set(sim_slot::DATA, RawRef::new(C_VECT, i)));
        let input_id = input
            .as_ref()
            .map(|_| self.alloc(C_VECT))
            .inspect(|&i| refs.set(sim_slot::INPUT, RawRef::new(C_VECT, i)));
        let offset = self.emit_object(&FrObject::SimData(s), id, &refs)?;
        self.toc.record_channel(ChannelKind::Sim, &name, offset, 0, 0);
        if let (Some(v), Some(vid)) = (data, data_id) {
            self.emit_vect(*v, vid, RawRef::NULL)?;
        }
        if let (Some(v), Some(vid)) = (input, input_id) {
            self.emit_vect(*v, vid, RawRef::NULL)?;
        }
        Ok(offset)
    }

    fn emit_event(&mut self, mut e: FrEvent, id: u32, next: RawRef) -> FrameResult<u64> {
        let name = e.name.clone();
        let data = e.data.take();
        let mut refs = SlotRefs::new();
        refs.set(SLOT_NEXT, next);
        let data_id = data
            .as_ref()
            .map(|_| self.alloc(C_VECT))
            .inspect(|&i| refs.set(event_slot::DATA, RawRef::new(C_VECT, i)));
        let offset = self.emit_object(&FrObject::Event(e), id, &refs)?;
        self.toc
            .record_channel(ChannelKind::Event, &name, offset, 0, 0);
        if let (Some(v), Some(vid)) = (data, data_id) {
            self.emit_vect(*v, vid, RawRef::NULL)?;
        }
        Ok(offset)
    }

    fn emit_sim_event(&mut self, mut e: FrSimEvent, id: u32, next: RawRef) -> FrameResult<u64> {
        let name = e.name.clone();
        let data = e.data.take();
        let mut refs = SlotRefs::new();
        refs.set(SLOT_NEXT, next);
        let data_id = data
            .as_ref()
            .map(|_| self.alloc(C_VECT))
            .inspect(|&i| refs.set(event_slot::DATA, RawRef::new(C_VECT, i)));
        let offset = self.emit_object(&FrObject::SimEvent(e), id, &refs)?;
        self.toc
            .record_channel(ChannelKind::SimEvent, &name, offset, 0, 0);
        if let (Some(v), Some(vid)) = (data, data_id) {
            self.emit_vect(*v, vid, RawRef::NULL)?;
        }
        Ok(offset)
    }

    fn emit_msg(&mut self, m: FrMsg, id: u32, next: RawRef) -> FrameResult<u64> {
        let mut refs = SlotRefs::new();
        refs.set(SLOT_NEXT, next);
        let offset = self.emit_object(&FrObject::Msg(m), id, &refs)?;
        self.note_first(FirstOffset::Msg, offset);
        Ok(offset)
    }

    fn emit_history_chain(&mut self, items: Vec<FrHistory>, ids: &[u32]) -> FrameResult<()> {
        for (i, h) in items.into_iter().enumerate() {
            let next = ids
                .get(i + 1)
                .map(|&n| RawRef::new(C_HISTORY, n))
                .unwrap_or(RawRef::NULL);
            let mut refs = SlotRefs::new();
            refs.set(SLOT_NEXT, next);
            self.emit_object(&FrObject::History(h), ids[i], &refs)?;
        }
        Ok(())
    }

    fn emit_table(&mut self, mut t: FrTable, id: u32, next: RawRef) -> FrameResult<u64> {
        let columns = std::mem::take(&mut t.columns);
        let mut refs = SlotRefs::new();
        refs.set(SLOT_NEXT, next);
        let column_ids = self.alloc_chain(C_VECT, columns.len());
        if let Some(&first) = column_ids.first() {
            refs.set(table_slot::COLUMN, RawRef::new(C_VECT, first));
        }
        let offset = self.emit_object(&FrObject::Table(t), id, &refs)?;
        self.emit_vect_chain(columns, &column_ids)?;
        Ok(offset)
    }

    fn emit_stat_data(&mut self, mut s: FrStatData, id: u32, next: RawRef) -> FrameResult<u64> {
        let data = s.data.take();
        let table = s.table.take();
        let mut refs = SlotRefs::new();
        refs.set(SLOT_NEXT, next);
        let data_id = data
            .as_ref()
            .map(|_| self.alloc(C_VECT))
            .inspect(|&i| refs.set(stat_slot::DATA, RawRef::new(C_VECT, i)));
        let table_id = table
            .as_ref()
            .map(|_| self.alloc(C_TABLE))
            .inspect(|&i| refs.set(stat_slot::TABLE, RawRef::new(C_TABLE, i)));
        let offset = self.emit_object(&FrObject::StatData(s), id, &refs)?;
        if let (Some(v), Some(vid)) = (data, data_id) {
            self.emit_vect(*v, vid, RawRef::NULL)?;
        }
        if let (Some(t), Some(tid)) = (table, table_id) {
            self.emit_table(*t, tid, RawRef::NULL)?;
        }
        Ok(offset)
    }

    fn emit_summary(&mut self, mut s: FrSummary, id: u32, next: RawRef) -> FrameResult<u64> {
        let moments = std::mem::take(&mut s.moments);
        let tables = std::mem::take(&mut s.tables);
        let mut refs = SlotRefs::new();
        refs.set(SLOT_NEXT, next);
        let moment_ids = self.alloc_chain(C_VECT, moments.len());
        if let Some(&first) = moment_ids.first() {
            refs.set(summary_slot::MOMENTS, RawRef::new(C_VECT, first));
        }
        let table_ids = self.alloc_chain(C_TABLE, tables.len());
        if let Some(&first) = table_ids.first() {
            refs.set(summary_slot::TABLE, RawRef::new(C_TABLE, first));
        }
        let offset = self.emit_object(&FrObject::Summary(s), id, &refs)?;
        self.note_first(FirstOffset::Summary, offset);
        self.emit_vect_chain(moments, &moment_ids)?;
        for (i, t) in tables.into_iter().enumerate() {
            let next = table_ids
                .get(i + 1)
                .map(|&n| RawRef::new(C_TABLE, n))
                .unwrap_or(RawRef::NULL);
            self.emit_table(t, table_ids[i], next)?;
        }
        Ok(offset)
    }

    fn emit_detector(&mut self, mut d: FrDetector, id: u32, next: RawRef) -> FrameResult<u64> {
        let aux = std::mem::take(&mut d.aux);
        let tables = std::mem::take(&mut d.tables);
        let stat = std::mem::take(&mut d.stat_data);
        let mut refs = SlotRefs::new();
        refs.set(SLOT_NEXT, next);
        let aux_ids = self.alloc_chain(C_VECT, aux.len());
        if let Some(&first) = aux_ids.first() {
            refs.set(detector_slot::AUX, RawRef::new(C_VECT, first));
        }
        let table_ids = self.alloc_chain(C_TABLE, tables.len());
        if let Some(&first) = table_ids.first() {
            refs.set(detector_slot::TABLE, RawRef::new(C_TABLE, first));
        }
        let stat_ids = self.alloc_chain(C_STAT, stat.len());
        if let Some(&first) = stat_ids.first() {
            refs.set(detector_slot::STAT, RawRef::new(C_STAT, first));
        }
        let offset = self.emit_object(&FrObject::Detector(d), id, &refs)?;
        self.emit_vect_chain(aux, &aux_ids)?;
        for (i, t) in tables.into_iter().enumerate() {
            let next = table_ids
                .get(i + 1)
                .map(|&n| RawRef::new(C_TABLE, n))
                .unwrap_or(RawRef::NULL);
            self.emit_table(t, table_ids[i], next)?;
        }
        for (i, s) in stat.into_iter().enumerate() {
            let next = stat_ids
                .get(i + 1)
                .map(|&n| RawRef::new(C_STAT, n))
                .unwrap_or(RawRef::NULL);
            self.emit_stat_data(s, stat_ids[i], next)?;
        }
        Ok(offset)
    }

    fn emit_raw_data(&mut self, mut raw: FrRawData, id: u32) -> FrameResult<u64> {
        let ser = std::mem::take(&mut raw.ser);
        let adc = std::mem::take(&mut raw.adc);
        let msgs = std::mem::take(&mut raw.msgs);
        let more = std::mem::take(&mut raw.more);
        let mut refs = SlotRefs::new();
        refs.set(SLOT_NEXT, RawRef::NULL);
        let ser_ids = self.alloc_chain(C_SER, ser.len());
        if let Some(&first) = ser_ids.first() {
            refs.set(raw_slot::SER, RawRef::new(C_SER, first));
        }
        let adc_ids = self.alloc_chain(C_ADC, adc.len());
        if let Some(&first) = adc_ids.first() {
            refs.set(raw_slot::ADC, RawRef::new(C_ADC, first));
        }
        let msg_ids = self.alloc_chain(C_MSG, msgs.len());
        if let Some(&first) = msg_ids.first() {
            refs.set(raw_slot::MSG, RawRef::new(C_MSG, first));
        }
        let more_ids = self.alloc_chain(C_VECT, more.len());
        if let Some(&first) = more_ids.first() {
            refs.set(raw_slot::MORE, RawRef::new(C_VECT, first));
        }
        let offset = self.emit_object(&FrObject::RawData(raw), id, &refs)?;
        for (i, s) in ser.into_iter().enumerate() {
            let next = ser_ids
                .get(i + 1)
                .map(|&n| RawRef::new(C_SER, n))
                .unwrap_or(RawRef::NULL);
            self.emit_ser(s, ser_ids[i], next)?;
        }
        for (i, a) in adc.into_iter().enumerate() {
            let next = adc_ids
                .get(i + 1)
                .map(|&n| RawRef::new(C_ADC, n))
                .unwrap_or(RawRef::NULL);
            self.emit_adc(a, adc_ids[i], next)?;
        }
        for (i, m) in msgs.into_iter().enumerate() {
            let next = msg_ids
                .get(i + 1)
                .map(|&n| RawRef::new(C_MSG, n))
                .unwrap_or(RawRef::NULL);
            self.emit_msg(m, msg_ids[i], next)?;
        }
        self.emit_vect_chain(more, &more_ids)?;
        Ok(offset)
    }

    fn emit_proc_chain(&mut self, items: Vec<FrProcData>, ids: &[u32]) -> FrameResult<()> {
        for (i, p) in items.into_iter().enumerate() {
            let next = ids
                .get(i + 1)
                .map(|&n| RawRef::new(C_PROC, n))
                .unwrap_or(RawRef::NULL);
            self.emit_proc(p, ids[i], next)?;
        }
        Ok(())
    }

    fn emit_sim_chain(&mut self, items: Vec<FrSimData>, ids: &[u32]) -> FrameResult<()> {
        for (i, s) in items.into_iter().enumerate() {
            let next = ids
                .get(i + 1)
                .map(|&n| RawRef::new(C_SIM, n))
                .unwrap_or(RawRef::NULL);
            self.emit_sim(s, ids[i], next)?;
        }
        Ok(())
    }

    fn emit_event_chain(&mut self, items: Vec<FrEvent>, ids: &[u32]) -> FrameResult<()> {
        for (i, e) in items.into_iter().enumerate() {
            let next = ids
                .get(i + 1)
                .map(|&n| RawRef::new(C_EVENT, n))
                .unwrap_or(RawRef::NULL);
            self.emit_event(e, ids[i], next)?;
        }
        Ok(())
    }

    fn emit_sim_event_chain(&mut self, items: Vec<FrSimEvent>, ids: &[u32]) -> FrameResult<()> {
        for (i, e) in items.into_iter().enumerate() {
            let next = ids
                .get(i + 1)
                .map(|&n| RawRef::new(C_SIMEVENT, n))
                .unwrap_or(RawRef::NULL);
            self.emit_sim_event(e, ids[i], next)?;
        }
        Ok(())
    }

    fn emit_summary_chain(&mut self, items: Vec<FrSummary>, ids: &[u32]) -> FrameResult<()> {
        for (i, s) in items.into_iter().enumerate() {
            let next = ids
                .get(i + 1)
                .map(|&n| RawRef::new(C_SUMMARY, n))
                .unwrap_or(RawRef::NULL);
            self.emit_summary(s, ids[i], next)?;
        }
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Close
    // ─────────────────────────────────────────────────────────────────────

    /// Write the table of contents and the end-of-file record, flush, and
    /// release the file.
    pub fn close(mut self) -> FrameResult<()> {
        self.guard()?;
        // Descriptions must precede the structures the offsets point at.
        self.ensure_described(ClassId::Toc)?;
        self.ensure_described(ClassId::EndOfFile)?;

        let builder = std::mem::take(&mut self.toc);
        let n_frames = builder.n_frames() as u32;
        let toc_obj = FrObject::Toc(builder.build());
        let seek_toc = self.buf.tell();
        let toc_id = self.alloc(C_TOC);
        self.emit_object(&toc_obj, toc_id, &SlotRefs::new())?;

        // The end-of-file record is framed by hand: the whole-file checksum
        // is snapshotted from the stream's CRC filter after every byte
        // before the checksum slot has passed through it.
        let eof_start = self.buf.tell();
        let length = end_of_file_struct_len(self.version);
        let n_bytes = eof_start + length;
        let eof_id = self.alloc(C_EOF);
        let mut head = StructWriter::new(self.order);
        head.write_u64(length);
        head.write_i16(C_EOF);
        head.write_u32(eof_id);
        head.write_u32(n_frames);
        head.write_u64(n_bytes);
        head.write_u64(seek_toc);
        self.buf.write_all(head.as_bytes())?;
        self.buf.sync_filters();
        let file_crc = self.file_crc.value();

        let mut tail = StructWriter::new(self.order);
        tail.write_u32(file_crc);
        if has_struct_checksum(self.version) {
            let mut image = head.as_bytes().to_vec();
            image.extend_from_slice(tail.as_bytes());
            let struct_crc = crc32(&image);
            tail.write_u32(struct_crc);
        }
        self.buf.write_all(tail.as_bytes())?;
        self.buf.flush()?;
        self.finished = true;
        Ok(())
    }
}
