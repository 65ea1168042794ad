//! Android hardware module ABI.
//!
//! Mirrors `hardware/hardware.h` and `hardware/sensors.h` (poll device API
//! 0.1) closely enough for the module loader to `dlsym` the module info and
//! open a `sensors_poll_device_t`.

use crate::config::load_default_config;
use crate::errors::SensorError;
use crate::messages::{EventPayload, SensorEvent};
use crate::poll::PollContext;
use crate::registry::{self, sensor_list};
use std::ffi::{c_char, c_int, c_void, CStr};
use std::sync::OnceLock;
use tracing::{error, info};

pub const fn make_tag(a: u8, b: u8, c: u8, d: u8) -> u32 {
    ((a as u32) << 24) | ((b as u32) << 16) | ((c as u32) << 8) | d as u32
}

pub const HARDWARE_MODULE_TAG: u32 = make_tag(b'H', b'W', b'M', b'T');
pub const HARDWARE_DEVICE_TAG: u32 = make_tag(b'H', b'W', b'D', b'T');
pub const SENSORS_HARDWARE_MODULE_ID: &CStr = c"sensors";
pub const SENSORS_HARDWARE_POLL: &CStr = c"poll";

#[cfg(target_pointer_width = "64")]
type Reserved = u64;
#[cfg(not(target_pointer_width = "64"))]
type Reserved = u32;

type OpenFn = unsafe extern "C" fn(*const HwModule, *const c_char, *mut *mut HwDevice) -> c_int;
type CloseFn = unsafe extern "C" fn(*mut HwDevice) -> c_int;
type GetSensorsListFn = unsafe extern "C" fn(*mut SensorsModule, *mut *const SensorT) -> c_int;
type ActivateFn = unsafe extern "C" fn(*mut SensorsPollDevice, c_int, c_int) -> c_int;
type SetDelayFn = unsafe extern "C" fn(*mut SensorsPollDevice, c_int, i64) -> c_int;
type PollFn = unsafe extern "C" fn(*mut SensorsPollDevice, *mut SensorsEvent, c_int) -> c_int;

/// `hw_module_t`
#[repr(C)]
pub struct HwModule {
    pub tag: u32,
    pub version_major: u16,
    pub version_minor: u16,
    pub id: *const c_char,
    pub name: *const c_char,
    pub author: *const c_char,
    pub methods: *const HwModuleMethods,
    pub dso: *mut c_void,
    pub reserved: [Reserved; 32 - 7],
}

/// `hw_module_methods_t`
#[repr(C)]
pub struct HwModuleMethods {
    pub open: Option<OpenFn>,
}

/// `hw_device_t`
#[repr(C)]
pub struct HwDevice {
    pub tag: u32,
    pub version: u32,
    pub module: *mut HwModule,
    pub reserved: [Reserved; 12],
    pub close: Option<CloseFn>,
}

/// `sensors_module_t`
#[repr(C)]
pub struct SensorsModule {
    pub common: HwModule,
    pub get_sensors_list: Option<GetSensorsListFn>,
}

/// `sensor_t`
#[repr(C)]
pub struct SensorT {
    pub name: *const c_char,
    pub vendor: *const c_char,
    pub version: c_int,
    pub handle: c_int,
    pub type_: c_int,
    pub max_range: f32,
    pub resolution: f32,
    pub power: f32,
    pub min_delay: i32,
    pub reserved: [*mut c_void; 8],
}

/// `sensors_event_t`; the payload union is flattened to `data`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorsEvent {
    pub version: i32,
    pub sensor: i32,
    pub type_: i32,
    pub reserved0: i32,
    pub timestamp: i64,
    pub data: [f32; 16],
    pub reserved1: [i32; 4],
}

impl From<&SensorEvent> for SensorsEvent {
    fn from(event: &SensorEvent) -> Self {
        let mut data = [0.0f32; 16];
        match event.payload {
            EventPayload::Acceleration { x, y, z } => {
                data[0] = x;
                data[1] = y;
                data[2] = z;
            }
            EventPayload::Distance(distance) => data[0] = distance,
            EventPayload::Light(lux) => data[0] = lux,
        }
        Self {
            version: event.version,
            sensor: event.sensor,
            type_: event.sensor_type.code(),
            reserved0: 0,
            timestamp: event.timestamp,
            data,
            reserved1: [0; 4],
        }
    }
}

/// `sensors_poll_device_t`
#[repr(C)]
pub struct SensorsPollDevice {
    pub common: HwDevice,
    pub activate: Option<ActivateFn>,
    pub set_delay: Option<SetDelayFn>,
    pub poll: Option<PollFn>,
}

/// The device handed to the framework; the C view comes first so the
/// framework's pointer doubles as a pointer to the whole allocation.
#[repr(C)]
struct PollDevice {
    device: SensorsPollDevice,
    context: PollContext,
}

impl PollDevice {
    fn new(context: PollContext, module: *const HwModule) -> Box<Self> {
        Box::new(Self {
            device: SensorsPollDevice {
                common: HwDevice {
                    tag: HARDWARE_DEVICE_TAG,
                    version: 0,
                    module: module as *mut HwModule,
                    reserved: [0; 12],
                    close: Some(poll_close),
                },
                activate: Some(poll_activate),
                set_delay: Some(poll_set_delay),
                poll: Some(poll_poll),
            },
            context,
        })
    }
}

#[repr(transparent)]
pub struct ModuleInfo(pub SensorsModule);

// SAFETY: the module info is immutable and only points at 'static data
unsafe impl Sync for ModuleInfo {}

static SENSORS_MODULE_METHODS: HwModuleMethods = HwModuleMethods {
    open: Some(open_sensors),
};

#[no_mangle]
pub static HAL_MODULE_INFO_SYM: ModuleInfo = ModuleInfo(SensorsModule {
    common: HwModule {
        tag: HARDWARE_MODULE_TAG,
        version_major: 1,
        version_minor: 0,
        id: SENSORS_HARDWARE_MODULE_ID.as_ptr(),
        name: c"Samsung Galaxy Cooper Sensors Module".as_ptr(),
        author: c"Cooper HAL developers".as_ptr(),
        methods: &SENSORS_MODULE_METHODS,
        dso: std::ptr::null_mut(),
        reserved: [0; 32 - 7],
    },
    get_sensors_list: Some(get_sensors_list),
});

struct SensorTable(Vec<SensorT>);

// SAFETY: entries only point at 'static C strings and are never mutated
unsafe impl Send for SensorTable {}
unsafe impl Sync for SensorTable {}

fn sensor_table() -> &'static SensorTable {
    static TABLE: OnceLock<SensorTable> = OnceLock::new();
    TABLE.get_or_init(|| {
        SensorTable(
            sensor_list()
                .iter()
                .map(|d| SensorT {
                    name: d.name.as_ptr(),
                    vendor: d.vendor.as_ptr(),
                    version: d.version,
                    handle: d.handle,
                    type_: d.sensor_type.code(),
                    max_range: d.max_range,
                    resolution: d.resolution,
                    power: d.power,
                    min_delay: d.min_delay,
                    reserved: [std::ptr::null_mut(); 8],
                })
                .collect(),
        )
    })
}

unsafe extern "C" fn get_sensors_list(_module: *mut SensorsModule, list: *mut *const SensorT) -> c_int {
    let table = sensor_table();
    if !list.is_null() {
        *list = table.0.as_ptr();
    }
    table.0.len() as c_int
}

unsafe extern "C" fn open_sensors(
    module: *const HwModule,
    id: *const c_char,
    device: *mut *mut HwDevice,
) -> c_int {
    crate::try_init_tracing();

    if id.is_null() || device.is_null() {
        return -libc::EINVAL;
    }
    if CStr::from_ptr(id) != SENSORS_HARDWARE_POLL {
        error!("[hal] unknown device id {:?}", CStr::from_ptr(id));
        return -libc::EINVAL;
    }

    let config = match load_default_config() {
        Ok(config) => config,
        Err(e) => {
            error!("[hal] {}", e);
            return -libc::EINVAL;
        }
    };
    let context = match registry::init_all(&config) {
        Ok(context) => context,
        Err(e) => {
            error!("[hal] {}", e);
            return e.errno();
        }
    };

    let poll_device = Box::into_raw(PollDevice::new(context, module));
    *device = poll_device as *mut HwDevice;
    info!("[hal] poll device opened");
    0
}

/// Shared view of the device. The framework calls `activate` and `poll`
/// from different threads, so nothing here may hand out `&mut`.
unsafe fn poll_device<'a>(dev: *mut SensorsPollDevice) -> Option<&'a PollDevice> {
    (dev as *const PollDevice).as_ref()
}

fn status(result: Result<(), SensorError>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("[hal] {}", e);
            e.errno()
        }
    }
}

unsafe extern "C" fn poll_close(dev: *mut HwDevice) -> c_int {
    if dev.is_null() {
        return -libc::EINVAL;
    }
    drop(Box::from_raw(dev as *mut PollDevice));
    info!("[hal] poll device closed");
    0
}

unsafe extern "C" fn poll_activate(dev: *mut SensorsPollDevice, handle: c_int, enabled: c_int) -> c_int {
    let Some(pd) = poll_device(dev) else {
        return -libc::EINVAL;
    };
    status(pd.context.activate(handle, enabled != 0))
}

unsafe extern "C" fn poll_set_delay(dev: *mut SensorsPollDevice, handle: c_int, ns: i64) -> c_int {
    let Some(pd) = poll_device(dev) else {
        return -libc::EINVAL;
    };
    status(pd.context.set_delay(handle, ns))
}

unsafe extern "C" fn poll_poll(dev: *mut SensorsPollDevice, data: *mut SensorsEvent, count: c_int) -> c_int {
    let Some(pd) = poll_device(dev) else {
        return -libc::EINVAL;
    };
    if data.is_null() || count < 1 {
        return -libc::EINVAL;
    }

    let mut events = Vec::with_capacity(count as usize);
    match pd.context.poll_events(&mut events, count as usize) {
        Ok(n) => {
            for (i, event) in events.iter().take(n).enumerate() {
                data.add(i).write(SensorsEvent::from(event));
            }
            n as c_int
        }
        Err(e) => {
            error!("[hal] poll failed: {}", e);
            e.errno()
        }
    }
}
