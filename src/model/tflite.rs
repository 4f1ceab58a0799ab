//! TensorFlow Lite backend over the C API, loaded from a shared library at runtime.

use std::ffi::{CString, c_char, c_int, c_void};
use std::path::Path;
use std::sync::Mutex;

use libloading::{Library, Symbol};

use super::{EmotionClassifier, GenreRecommender, ModelError};
use crate::analyzer::AcousticDescriptor;
use crate::context::ContextVector;

#[repr(C)]
struct TfLiteModel {
    _private: [u8; 0],
}
#[repr(C)]
struct TfLiteInterpreterOptions {
    _private: [u8; 0],
}
#[repr(C)]
struct TfLiteInterpreter {
    _private: [u8; 0],
}
#[repr(C)]
struct TfLiteTensor {
    _private: [u8; 0],
}

type TfLiteStatus = c_int;
type TfLiteType = c_int;

const TFLITE_OK: TfLiteStatus = 0;
const TFLITE_FLOAT32: TfLiteType = 1;
const F32_BYTES: usize = std::mem::size_of::<f32>();

/// One loaded model plus its interpreter. Batch size one; calls serialize on the mutex.
pub struct TfliteModel {
    input_width: usize,
    runtime: Mutex<Interpreter>,
}

impl TfliteModel {
    pub fn load(model_path: &Path, runtime_lib: &Path, threads: i32) -> Result<Self, ModelError> {
        if !model_path.exists() {
            return Err(ModelError::NotFound(model_path.to_path_buf()));
        }
        let api = TfliteApi::load(runtime_lib)?;
        let interpreter = Interpreter::new(api, model_path, threads.max(1))?;
        let input_width = interpreter.input_len()?;
        log::info!(
            "Loaded {} (input width {input_width})",
            model_path.display()
        );
        Ok(Self {
            input_width,
            runtime: Mutex::new(interpreter),
        })
    }

    fn run(&self, input: &[f32]) -> Result<Vec<f32>, ModelError> {
        if input.len() != self.input_width {
            return Err(ModelError::Shape {
                expected: self.input_width,
                actual: input.len(),
            });
        }
        let mut interpreter = self
            .runtime
            .lock()
            .map_err(|_| ModelError::Runtime("interpreter lock poisoned".into()))?;
        interpreter.run(input)
    }
}

impl EmotionClassifier for TfliteModel {
    fn input_width(&self) -> usize {
        self.input_width
    }

    fn predict(&self, descriptor: &AcousticDescriptor) -> Result<Vec<f32>, ModelError> {
        self.run(descriptor.as_slice())
    }
}

impl GenreRecommender for TfliteModel {
    fn predict(&self, vector: &ContextVector) -> Result<Vec<f32>, ModelError> {
        self.run(&vector.to_features())
    }
}

struct Interpreter {
    api: TfliteApi,
    model: *mut TfLiteModel,
    options: *mut TfLiteInterpreterOptions,
    interpreter: *mut TfLiteInterpreter,
}

// SAFETY: the interpreter is only touched through `&mut self`, and `TfliteModel`
// wraps it in a Mutex, so the raw handles never see concurrent use.
unsafe impl Send for Interpreter {}

impl Interpreter {
    fn new(api: TfliteApi, model_path: &Path, threads: i32) -> Result<Self, ModelError> {
        let model_c = CString::new(model_path.to_string_lossy().as_bytes())
            .map_err(|_| ModelError::Runtime("model path contains a NUL byte".into()))?;
        let model = unsafe { (api.model_create)(model_c.as_ptr()) };
        if model.is_null() {
            return Err(ModelError::Runtime(format!(
                "failed to parse model {}",
                model_path.display()
            )));
        }
        let options = unsafe { (api.interpreter_options_create)() };
        if options.is_null() {
            unsafe { (api.model_delete)(model) };
            return Err(ModelError::Runtime("failed to create interpreter options".into()));
        }
        unsafe { (api.interpreter_options_set_num_threads)(options, threads) };
        let interpreter = unsafe { (api.interpreter_create)(model, options) };
        if interpreter.is_null() {
            unsafe {
                (api.interpreter_options_delete)(options);
                (api.model_delete)(model);
            }
            return Err(ModelError::Runtime("failed to create interpreter".into()));
        }
        // From here on Drop releases all three handles
        let this = Self {
            api,
            model,
            options,
            interpreter,
        };
        let status = unsafe { (this.api.interpreter_allocate_tensors)(this.interpreter) };
        if status != TFLITE_OK {
            return Err(ModelError::Runtime("failed to allocate tensors".into()));
        }
        Ok(this)
    }

    fn input_tensor(&self) -> Result<*mut TfLiteTensor, ModelError> {
        let tensor = unsafe { (self.api.interpreter_get_input_tensor)(self.interpreter, 0) };
        if tensor.is_null() {
            return Err(ModelError::Runtime("model has no input tensor".into()));
        }
        let ty = unsafe { (self.api.tensor_type)(tensor) };
        if ty != TFLITE_FLOAT32 {
            return Err(ModelError::Runtime(format!("unsupported input tensor type {ty}")));
        }
        Ok(tensor)
    }

    /// Number of f32 elements in input tensor 0.
    fn input_len(&self) -> Result<usize, ModelError> {
        let tensor = self.input_tensor()?;
        Ok(unsafe { (self.api.tensor_byte_size)(tensor) } / F32_BYTES)
    }

    fn run(&mut self, input: &[f32]) -> Result<Vec<f32>, ModelError> {
        let tensor = self.input_tensor()?;
        let byte_size = unsafe { (self.api.tensor_byte_size)(tensor) };
        let input_bytes = input.len() * F32_BYTES;
        if byte_size != input_bytes {
            return Err(ModelError::Shape {
                expected: byte_size / F32_BYTES,
                actual: input.len(),
            });
        }
        let status = unsafe {
            (self.api.tensor_copy_from_buffer)(tensor, input.as_ptr() as *const c_void, input_bytes)
        };
        if status != TFLITE_OK {
            return Err(ModelError::Runtime("failed to copy input tensor".into()));
        }
        let status = unsafe { (self.api.interpreter_invoke)(self.interpreter) };
        if status != TFLITE_OK {
            return Err(ModelError::Runtime("interpreter invoke failed".into()));
        }
        self.read_output()
    }

    fn read_output(&self) -> Result<Vec<f32>, ModelError> {
        let count = unsafe { (self.api.interpreter_get_output_tensor_count)(self.interpreter) };
        if count <= 0 {
            return Err(ModelError::Runtime("model has no outputs".into()));
        }
        let tensor = unsafe { (self.api.interpreter_get_output_tensor)(self.interpreter, 0) };
        if tensor.is_null() {
            return Err(ModelError::Runtime("output tensor 0 is null".into()));
        }
        let ty = unsafe { (self.api.tensor_type)(tensor) };
        if ty != TFLITE_FLOAT32 {
            return Err(ModelError::Runtime(format!("unsupported output tensor type {ty}")));
        }
        let byte_size = unsafe { (self.api.tensor_byte_size)(tensor) };
        let mut data = vec![0.0_f32; byte_size / F32_BYTES];
        let status = unsafe {
            (self.api.tensor_copy_to_buffer)(
                tensor,
                data.as_mut_ptr() as *mut c_void,
                data.len() * F32_BYTES,
            )
        };
        if status != TFLITE_OK {
            return Err(ModelError::Runtime("failed to read output tensor".into()));
        }
        Ok(data)
    }
}

impl Drop for Interpreter {
    fn drop(&mut self) {
        unsafe {
            (self.api.interpreter_delete)(self.interpreter);
            (self.api.interpreter_options_delete)(self.options);
            (self.api.model_delete)(self.model);
        }
    }
}

type ModelCreateFn = unsafe extern "C" fn(*const c_char) -> *mut TfLiteModel;
type ModelDeleteFn = unsafe extern "C" fn(*mut TfLiteModel);
type OptionsCreateFn = unsafe extern "C" fn() -> *mut TfLiteInterpreterOptions;
type OptionsDeleteFn = unsafe extern "C" fn(*mut TfLiteInterpreterOptions);
type OptionsSetThreadsFn = unsafe extern "C" fn(*mut TfLiteInterpreterOptions, c_int);
type InterpreterCreateFn = unsafe extern "C" fn(
    *const TfLiteModel,
    *const TfLiteInterpreterOptions,
) -> *mut TfLiteInterpreter;
type InterpreterDeleteFn = unsafe extern "C" fn(*mut TfLiteInterpreter);
type InterpreterStatusFn = unsafe extern "C" fn(*mut TfLiteInterpreter) -> TfLiteStatus;
type InputTensorFn = unsafe extern "C" fn(*const TfLiteInterpreter, c_int) -> *mut TfLiteTensor;
type OutputTensorFn = unsafe extern "C" fn(*const TfLiteInterpreter, c_int) -> *const TfLiteTensor;
type OutputCountFn = unsafe extern "C" fn(*const TfLiteInterpreter) -> c_int;
type CopyFromFn = unsafe extern "C" fn(*mut TfLiteTensor, *const c_void, usize) -> TfLiteStatus;
type CopyToFn = unsafe extern "C" fn(*const TfLiteTensor, *mut c_void, usize) -> TfLiteStatus;
type TensorTypeFn = unsafe extern "C" fn(*const TfLiteTensor) -> TfLiteType;
type TensorByteSizeFn = unsafe extern "C" fn(*const TfLiteTensor) -> usize;

/// Function table resolved from the runtime library. The pointers stay valid
/// while `_lib` is alive, and `_lib` lives as long as the table.
struct TfliteApi {
    _lib: Library,
    model_create: ModelCreateFn,
    model_delete: ModelDeleteFn,
    interpreter_options_create: OptionsCreateFn,
    interpreter_options_delete: OptionsDeleteFn,
    interpreter_options_set_num_threads: OptionsSetThreadsFn,
    interpreter_create: InterpreterCreateFn,
    interpreter_delete: InterpreterDeleteFn,
    interpreter_allocate_tensors: InterpreterStatusFn,
    interpreter_invoke: InterpreterStatusFn,
    interpreter_get_input_tensor: InputTensorFn,
    interpreter_get_output_tensor: OutputTensorFn,
    interpreter_get_output_tensor_count: OutputCountFn,
    tensor_copy_from_buffer: CopyFromFn,
    tensor_copy_to_buffer: CopyToFn,
    tensor_type: TensorTypeFn,
    tensor_byte_size: TensorByteSizeFn,
}

impl TfliteApi {
    fn load(path: &Path) -> Result<Self, ModelError> {
        let lib = unsafe { Library::new(path) }.map_err(|e| {
            log::error!("Cannot load TFLite runtime {}: {e}", path.display());
            ModelError::NotFound(path.to_path_buf())
        })?;
        let missing = |e: libloading::Error| ModelError::Runtime(format!("TFLite symbol: {e}"));
        // SAFETY: each name is paired with the signature the TFLite C API declares for it.
        unsafe {
            Ok(Self {
                model_create: symbol(&lib, b"TfLiteModelCreateFromFile\0").map_err(missing)?,
                model_delete: symbol(&lib, b"TfLiteModelDelete\0").map_err(missing)?,
                interpreter_options_create: symbol(&lib, b"TfLiteInterpreterOptionsCreate\0")
                    .map_err(missing)?,
                interpreter_options_delete: symbol(&lib, b"TfLiteInterpreterOptionsDelete\0")
                    .map_err(missing)?,
                interpreter_options_set_num_threads: symbol(
                    &lib,
                    b"TfLiteInterpreterOptionsSetNumThreads\0",
                )
                .map_err(missing)?,
                interpreter_create: symbol(&lib, b"TfLiteInterpreterCreate\0").map_err(missing)?,
                interpreter_delete: symbol(&lib, b"TfLiteInterpreterDelete\0").map_err(missing)?,
                interpreter_allocate_tensors: symbol(&lib, b"TfLiteInterpreterAllocateTensors\0")
                    .map_err(missing)?,
                interpreter_invoke: symbol(&lib, b"TfLiteInterpreterInvoke\0").map_err(missing)?,
                interpreter_get_input_tensor: symbol(&lib, b"TfLiteInterpreterGetInputTensor\0")
                    .map_err(missing)?,
                interpreter_get_output_tensor: symbol(&lib, b"TfLiteInterpreterGetOutputTensor\0")
                    .map_err(missing)?,
                interpreter_get_output_tensor_count: symbol(
                    &lib,
                    b"TfLiteInterpreterGetOutputTensorCount\0",
                )
                .map_err(missing)?,
                tensor_copy_from_buffer: symbol(&lib, b"TfLiteTensorCopyFromBuffer\0")
                    .map_err(missing)?,
                tensor_copy_to_buffer: symbol(&lib, b"TfLiteTensorCopyToBuffer\0")
                    .map_err(missing)?,
                tensor_type: symbol(&lib, b"TfLiteTensorType\0").map_err(missing)?,
                tensor_byte_size: symbol(&lib, b"TfLiteTensorByteSize\0").map_err(missing)?,
                _lib: lib,
            })
        }
    }
}

/// Copy a function pointer out of `lib`.
///
/// # Safety
/// `T` must match the C signature of `name`, and the pointer must not outlive `lib`.
unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Result<T, libloading::Error> {
    let sym: Symbol<'_, T> = unsafe { lib.get(name)? };
    Ok(*sym)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_model_is_not_found() {
        let err = TfliteModel::load(
            Path::new("/nonexistent/emotion.tflite"),
            Path::new("libtensorflowlite_c.so"),
            1,
        )
        .err();
        assert!(matches!(err, Some(ModelError::NotFound(p)) if p.ends_with("emotion.tflite")));
    }

    #[test]
    fn test_missing_runtime_is_not_found() {
        let dir = TempDir::new().unwrap();
        let model = dir.path().join("genre.tflite");
        std::fs::write(&model, b"TFL3").unwrap();
        let runtime = dir.path().join("libtensorflowlite_c_missing.so");
        let err = TfliteModel::load(&model, &runtime, 1).err();
        assert!(matches!(err, Some(ModelError::NotFound(p)) if p == runtime));
    }
}
