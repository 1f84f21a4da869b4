pub mod kirikiri;
