//! Dense row-major buffers, the native tensor representation.

use crate::error::Error;
use crate::ftype::{ElemType, FType, FTyped};
use crate::value::Value;

#[derive(Clone, Debug, PartialEq)]
pub enum BufData {
    I64(Vec<i64>),
    F64(Vec<f64>),
}

/// A dense multi-dimensional buffer with row-major layout.
#[derive(Clone, Debug, PartialEq)]
pub struct NdBuffer {
    shape: Vec<usize>,
    data: BufData,
}

impl NdBuffer {
    pub fn from_i64(data: Vec<i64>, shape: Vec<usize>) -> Result<Self, Error> {
        Self::check_extent(data.len(), &shape)?;
        Ok(Self {
            shape,
            data: BufData::I64(data),
        })
    }

    pub fn from_f64(data: Vec<f64>, shape: Vec<usize>) -> Result<Self, Error> {
        Self::check_extent(data.len(), &shape)?;
        Ok(Self {
            shape,
            data: BufData::F64(data),
        })
    }

    /// A zero-filled buffer of the given element type and shape; used by
    /// callers to pre-allocate outputs from a result FType.
    pub fn zeros(elem: ElemType, shape: &[usize]) -> Result<Self, Error> {
        let len = shape.iter().product();
        match elem {
            ElemType::I64 => Self::from_i64(vec![0; len], shape.to_vec()),
            ElemType::F64 => Self::from_f64(vec![0.0; len], shape.to_vec()),
            ElemType::Bool => Err(Error::mismatch("buffers of bool are not supported")),
        }
    }

    fn check_extent(len: usize, shape: &[usize]) -> Result<(), Error> {
        let expected: usize = shape.iter().product();
        if len != expected {
            return Err(Error::mismatch(format!(
                "buffer of {len} element(s) does not fill shape {shape:?}"
            )));
        }
        Ok(())
    }

    pub fn elem_type(&self) -> ElemType {
        match self.data {
            BufData::I64(_) => ElemType::I64,
            BufData::F64(_) => ElemType::F64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        match &self.data {
            BufData::I64(v) => v.len(),
            BufData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> &BufData {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut BufData {
        &mut self.data
    }

    /// Row-major linear offset for a full multi-index.
    fn offset(&self, index: &[usize]) -> Result<usize, Error> {
        if index.len() != self.shape.len()
            || index.iter().zip(&self.shape).any(|(i, extent)| i >= extent)
        {
            return Err(Error::OutOfBounds {
                index: index.to_vec(),
                shape: self.shape.clone(),
            });
        }
        let mut linear = 0usize;
        for (i, extent) in index.iter().zip(&self.shape) {
            linear = linear * extent + i;
        }
        Ok(linear)
    }

    pub fn get(&self, index: &[usize]) -> Result<Value, Error> {
        let at = self.offset(index)?;
        Ok(match &self.data {
            BufData::I64(v) => Value::Int(v[at]),
            BufData::F64(v) => Value::Float(v[at]),
        })
    }

    pub fn set(&mut self, index: &[usize], value: &Value) -> Result<(), Error> {
        let at = self.offset(index)?;
        match (&mut self.data, value) {
            (BufData::I64(v), Value::Int(x)) => v[at] = *x,
            (BufData::F64(v), Value::Float(x)) => v[at] = *x,
            // Storing an integer into a float buffer widens, as in C.
            (BufData::F64(v), Value::Int(x)) => v[at] = *x as f64,
            (data, value) => {
                let elem = match data {
                    BufData::I64(_) => ElemType::I64,
                    BufData::F64(_) => ElemType::F64,
                };
                return Err(Error::mismatch(format!(
                    "cannot store {} into a buffer of {elem}",
                    value.type_name()
                )));
            }
        }
        Ok(())
    }
}

impl FTyped for NdBuffer {
    fn ftype(&self) -> FType {
        FType::tensor(self.elem_type(), self.ndim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_mismatch_rejected() {
        assert!(NdBuffer::from_i64(vec![1, 2, 3], vec![2, 2]).is_err());
    }

    #[test]
    fn test_row_major_indexing() {
        let buf = NdBuffer::from_i64(vec![1, 2, 3, 4, 5, 6], vec![2, 3]).unwrap();
        assert_eq!(buf.get(&[0, 0]).unwrap(), Value::Int(1));
        assert_eq!(buf.get(&[0, 2]).unwrap(), Value::Int(3));
        assert_eq!(buf.get(&[1, 0]).unwrap(), Value::Int(4));
        assert_eq!(buf.get(&[1, 2]).unwrap(), Value::Int(6));
    }

    #[test]
    fn test_out_of_bounds() {
        let buf = NdBuffer::from_i64(vec![1, 2], vec![2]).unwrap();
        assert!(matches!(
            buf.get(&[2]).unwrap_err(),
            Error::OutOfBounds { .. }
        ));
        assert!(matches!(
            buf.get(&[0, 0]).unwrap_err(),
            Error::OutOfBounds { .. }
        ));
    }

    #[test]
    fn test_set_checks_element_type() {
        let mut buf = NdBuffer::from_i64(vec![0], vec![1]).unwrap();
        assert!(buf.set(&[0], &Value::Float(1.5)).is_err());
        buf.set(&[0], &Value::Int(7)).unwrap();
        assert_eq!(buf.get(&[0]).unwrap(), Value::Int(7));
    }

    #[test]
    fn test_ftype_matches_rank() {
        let buf = NdBuffer::from_f64(vec![0.0; 6], vec![2, 3]).unwrap();
        assert_eq!(buf.ftype(), FType::tensor(ElemType::F64, 2));
    }
}
